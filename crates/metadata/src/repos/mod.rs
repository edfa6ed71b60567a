//! Repository traits for metadata operations.

pub mod clients;
pub mod files;

pub use clients::ClientRepo;
pub use files::FileRepo;
