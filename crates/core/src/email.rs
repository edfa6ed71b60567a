//! Contact email validation.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum accepted address length (RFC 5321 path limit).
pub const MAX_EMAIL_LEN: usize = 254;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern is valid")
});

/// Normalize an optional contact email supplied with an upload.
///
/// Blank input means "no email" and yields `Ok(None)`.
pub fn validate_optional(email: Option<&str>) -> crate::Result<Option<String>> {
    let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    validate(email).map(|()| Some(email.to_string()))
}

/// Check that an address is well formed.
pub fn validate(email: &str) -> crate::Result<()> {
    if email.len() > MAX_EMAIL_LEN {
        return Err(crate::Error::InvalidEmail(format!(
            "address longer than {MAX_EMAIL_LEN} bytes"
        )));
    }
    if !EMAIL_PATTERN.is_match(email) {
        return Err(crate::Error::InvalidEmail(format!("malformed address: {email}")));
    }
    Ok(())
}
