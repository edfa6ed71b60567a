//! HTTP API server for the MOADA anonymous file drop.
//!
//! This crate provides:
//! - The file lifecycle (upload, download, delete, erase-all)
//! - Quota accounting and per-client rate limiting
//! - Antivirus scanning of uploads through clamd
//! - Client attribution from network addresses
//! - HTTP routes, CORS and Prometheus metrics

pub mod client_ip;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod metrics;
pub mod routes;
pub mod state;

pub use client_ip::Client;
pub use error::ApiError;
pub use lifecycle::{Lifecycle, LifecycleDeps};
pub use routes::create_router;
pub use state::AppState;
