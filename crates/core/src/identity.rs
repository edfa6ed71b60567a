//! Anonymous client identities.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable anonymous identity of a client, derived from its network address.
///
/// The token is the lowercase hex SHA-256 of the address string and doubles
/// as the name of the client's storage directory. The address itself is
/// never stored.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Derive the identity of a network address.
    pub fn from_address(address: &str) -> Self {
        Self(ContentHash::compute(address.as_bytes()).to_hex())
    }

    /// Parse a previously derived identity token.
    pub fn parse(token: &str) -> crate::Result<Self> {
        ContentHash::from_hex(token)
            .map(|_| Self(token.to_string()))
            .map_err(|e| crate::Error::InvalidIdentifier(format!("client identity: {e}")))
    }

    /// Get the token as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClientIdentity {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<ClientIdentity> for String {
    fn from(value: ClientIdentity) -> Self {
        value.0
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientIdentity({})", &self.0[..12])
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
