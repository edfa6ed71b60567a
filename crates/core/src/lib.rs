//! Core domain types and shared logic for MOADA.
//!
//! This crate defines the data model used across all other crates:
//! - Client identities derived from network addresses
//! - Public and private file identifiers
//! - Uploaded file names, content types and contact emails
//! - File and client records
//! - Configuration and the injectable clock

pub mod clock;
pub mod config;
pub mod content_type;
pub mod email;
pub mod error;
pub mod file_id;
pub mod file_name;
pub mod hash;
pub mod identity;
pub mod record;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use error::{Error, Result};
pub use file_id::{FileIds, IdDeriver, PrivateId, PublicId, Secrets, file_key};
pub use file_name::FileName;
pub use hash::{ContentHash, ContentHasher};
pub use identity::ClientIdentity;
pub use record::{ClientRecord, FileRecord, Usage};

/// Per-client storage cap: 75 MiB.
pub const DEFAULT_PER_CLIENT_BYTES: u64 = 75 * 1024 * 1024;

/// Host-wide storage cap as a multiple of the per-client cap.
pub const HOST_CAP_MULTIPLIER: u64 = 68;

/// Calls allowed per rate-limit window.
pub const DEFAULT_MAX_CALLS: u32 = 5;

/// Rate-limit window: one minute.
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Lifetime of file and client records: one day.
pub const DEFAULT_RECORD_TTL_SECS: u64 = 24 * 60 * 60;
