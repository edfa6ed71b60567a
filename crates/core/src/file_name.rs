//! Uploaded file names and their storage extension.

use std::fmt;

/// Maximum accepted file name length in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Maximum accepted extension length in bytes.
pub const MAX_EXTENSION_LEN: usize = 16;

/// A validated display name plus the extension used for the stored file.
///
/// The extension is the segment following the first dot, so
/// `backup.tar.gz` is stored with extension `tar`.
#[derive(Clone, PartialEq, Eq)]
pub struct FileName {
    name: String,
    extension: String,
}

impl FileName {
    /// Validate a client-supplied file name.
    ///
    /// Directory components are stripped; only the final segment is kept.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let name = raw
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();

        if name.is_empty() {
            return Err(crate::Error::InvalidFileName("empty file name".to_string()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(crate::Error::InvalidFileName(format!(
                "file name longer than {MAX_NAME_LEN} bytes"
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(crate::Error::InvalidFileName(
                "file name contains control characters".to_string(),
            ));
        }

        let Some((_, rest)) = name.split_once('.') else {
            return Err(crate::Error::InvalidFileName(format!(
                "missing extension: {name}"
            )));
        };
        let extension = rest.split('.').next().unwrap_or_default();

        if extension.is_empty() {
            return Err(crate::Error::InvalidFileName(format!(
                "empty extension: {name}"
            )));
        }
        if extension.len() > MAX_EXTENSION_LEN
            || !extension.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(crate::Error::InvalidFileName(format!(
                "unsupported extension: {extension}"
            )));
        }

        Ok(Self {
            extension: extension.to_string(),
            name: name.to_string(),
        })
    }

    /// The display name.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The extension used on disk.
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileName({:?})", self.name)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
