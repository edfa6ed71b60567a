//! Allow-list of accepted upload content types.

/// Content types accepted for upload.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "application/pdf",
    "application/json",
    "application/zip",
    "application/x-tar",
    "application/x-rar-compressed",
    "text/plain",
    "audio/mpeg",
    "audio/x-wav",
    "audio/x-flac",
];

/// Check a declared content type against the allow-list.
///
/// Parameters such as `; charset=utf-8` are ignored and the comparison is
/// case-insensitive.
pub fn check(content_type: &str) -> crate::Result<()> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if ALLOWED_CONTENT_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        Err(crate::Error::DisallowedContentType(content_type.to_string()))
    }
}
