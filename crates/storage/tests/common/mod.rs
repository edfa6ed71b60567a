pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{plant, seeded_bytes, sha256_hash};
