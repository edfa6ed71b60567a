//! HTTP request handlers.

pub mod clients;
pub mod common;
pub mod files;
pub mod health;

pub use clients::*;
pub use common::*;
pub use files::*;
pub use health::*;
