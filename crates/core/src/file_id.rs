//! Public and private file identifiers.
//!
//! Both identifiers are derived from the uploaded bytes, the original file
//! name and server-side secrets. The raw derived values never leave this
//! module: they are sealed by hashing them once more, and only the sealed
//! form is persisted, returned to clients, and used as the on-disk name.

use crate::hash::{ContentHash, ContentHasher};
use crate::identity::ClientIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-side secret material mixed into identifier derivation.
#[derive(Clone)]
pub struct Secrets {
    primary: String,
    exclusion: String,
}

impl Secrets {
    /// Create secrets from the primary and exclusion values.
    pub fn new(primary: impl Into<String>, exclusion: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            exclusion: exclusion.into(),
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("primary", &"<redacted>")
            .field("exclusion", &"<redacted>")
            .finish()
    }
}

/// Identifier used to retrieve a file.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicId(String);

impl PublicId {
    /// Parse a sealed public identifier.
    pub fn parse(s: &str) -> crate::Result<Self> {
        parse_sealed(s, "public id").map(Self)
    }

    /// Recover the public identifier from a stored file name (`<id>.<ext>`).
    pub fn from_stored_name(name: &str) -> crate::Result<Self> {
        let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
        Self::parse(stem)
    }

    /// Get the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier that authorizes deletion of a file.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrivateId(String);

impl PrivateId {
    /// Parse a sealed private identifier.
    pub fn parse(s: &str) -> crate::Result<Self> {
        parse_sealed(s, "private id").map(Self)
    }

    /// Get the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn parse_sealed(s: &str, what: &str) -> crate::Result<String> {
    ContentHash::from_hex(s)
        .map(|_| s.to_string())
        .map_err(|e| crate::Error::InvalidIdentifier(format!("{what}: {e}")))
}

fn seal(raw: ContentHash) -> String {
    ContentHash::compute(raw.as_bytes()).to_hex()
}

macro_rules! string_newtype_conversions {
    ($ty:ident, $label:literal) => {
        impl TryFrom<String> for $ty {
            type Error = crate::Error;

            fn try_from(value: String) -> crate::Result<Self> {
                Self::parse(&value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), &self.0[..12])
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_newtype_conversions!(PublicId, "PublicId");
string_newtype_conversions!(PrivateId, "PrivateId");

/// A derived identifier pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileIds {
    pub public: PublicId,
    pub private: PrivateId,
}

impl FileIds {
    /// Derive identifiers for in-memory content.
    pub fn derive(bytes: &[u8], name: &str, secrets: &Secrets) -> Self {
        let mut deriver = IdDeriver::new(bytes.len() as u64);
        deriver.update(bytes);
        deriver.finish(name, secrets)
    }
}

/// Incremental identifier derivation for content read in chunks.
///
/// The total content length must be known up front because it frames the
/// content in the digest input.
pub struct IdDeriver {
    hasher: ContentHasher,
}

impl IdDeriver {
    /// Start a derivation for content of `content_len` bytes.
    pub fn new(content_len: u64) -> Self {
        let mut hasher = ContentHash::hasher();
        hasher.update(&content_len.to_be_bytes());
        Self { hasher }
    }

    /// Feed the next chunk of content.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Finish with the file name and secrets, returning sealed identifiers.
    pub fn finish(self, name: &str, secrets: &Secrets) -> FileIds {
        let mut public = self.hasher;
        public.update_framed(name.as_bytes());
        public.update_framed(secrets.primary.as_bytes());

        let mut private = public.clone();
        private.update_framed(secrets.exclusion.as_bytes());

        FileIds {
            public: PublicId(seal(public.finalize())),
            private: PrivateId(seal(private.finalize())),
        }
    }
}

/// Storage key of a client's copy of a file: `<identity>/<public id>.<ext>`.
pub fn file_key(identity: &ClientIdentity, public_id: &PublicId, extension: &str) -> String {
    format!("{identity}/{public_id}.{extension}")
}
