//! File lifecycle: upload, download, delete and erase-all.
//!
//! [`Lifecycle`] sequences the storage tree, the catalog, the quota ledger,
//! the rate limiter and the antivirus scanner. No step is retried and no
//! multi-step operation is transactional; partial commits are logged as
//! corruption candidates.

pub mod delete;
pub mod download;
pub mod erase;
pub mod error;
pub mod info;
pub mod ledger;
pub mod ratelimit;
pub mod scanner;
pub mod upload;

pub use download::Download;
pub use erase::Erased;
pub use error::{ErrorKind, LifecycleError, LifecycleResult, NOT_ALLOWED_MESSAGE, QuotaScope};
pub use ledger::{QuotaLedger, ReconcilingLedger};
pub use ratelimit::RateLimiter;
pub use scanner::{ClamdEndpoint, ClamdScanner, DisabledScanner, ScanVerdict, Scanner};
pub use upload::{UploadOutcome, UploadRequest};

use moada_core::config::AppConfig;
use moada_core::{ClientIdentity, Clock, FileName, FileRecord, Secrets, file_key};
use moada_metadata::MetadataStore;
use moada_storage::{FileStore, StagingArea};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Services the lifecycle runs against.
#[derive(Clone)]
pub struct LifecycleDeps {
    pub storage: Arc<dyn FileStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub staging: StagingArea,
    pub scanner: Arc<dyn Scanner>,
    pub clock: Arc<dyn Clock>,
}

/// Size and time limits applied by the lifecycle.
#[derive(Clone, Copy, Debug)]
struct Limits {
    per_client_bytes: u64,
    host_bytes: u64,
    record_ttl: time::Duration,
    io_timeout: Duration,
}

/// Orchestrates every file operation.
pub struct Lifecycle {
    storage: Arc<dyn FileStore>,
    metadata: Arc<dyn MetadataStore>,
    staging: StagingArea,
    scanner: Arc<dyn Scanner>,
    clock: Arc<dyn Clock>,
    ledger: Arc<dyn QuotaLedger>,
    rate_limiter: RateLimiter,
    secrets: Secrets,
    limits: Limits,
}

impl Lifecycle {
    /// Wire the lifecycle with a [`ReconcilingLedger`].
    pub fn new(config: &AppConfig, deps: LifecycleDeps) -> Self {
        let limits = Limits {
            per_client_bytes: config.quota.per_client_bytes,
            host_bytes: config.quota.host_bytes,
            record_ttl: config.quota.record_ttl(),
            io_timeout: config.server.io_timeout(),
        };

        let ledger = Arc::new(ReconcilingLedger::new(
            deps.storage.clone(),
            deps.metadata.clone(),
            deps.clock.clone(),
            limits.record_ttl,
            limits.io_timeout,
        ));
        let rate_limiter =
            RateLimiter::new(&config.rate_limit, deps.metadata.clone(), deps.clock.clone());

        Self {
            storage: deps.storage,
            metadata: deps.metadata,
            staging: deps.staging,
            scanner: deps.scanner,
            clock: deps.clock,
            ledger,
            rate_limiter,
            secrets: config.secrets.to_secrets(),
            limits,
        }
    }

    /// Replace the quota ledger.
    pub fn with_ledger(mut self, ledger: Arc<dyn QuotaLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// The antivirus scanner in use.
    pub fn scanner(&self) -> &Arc<dyn Scanner> {
        &self.scanner
    }

    /// Storage key of `record` inside the directory of `identity`.
    fn key_for(&self, identity: &ClientIdentity, record: &FileRecord) -> LifecycleResult<String> {
        let name = FileName::parse(&record.name).map_err(|e| {
            LifecycleError::Corruption(format!(
                "catalog entry {} has an unusable name: {e}",
                record.public_id
            ))
        })?;
        Ok(file_key(identity, &record.public_id, name.extension()))
    }
}

/// Run a step under `limit`, failing with `Timeout { step }` when it expires.
pub(crate) async fn timed<T, E, F>(limit: Duration, step: &str, fut: F) -> LifecycleResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<LifecycleError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::warn!(step, timeout_secs = limit.as_secs(), "Step timed out");
            Err(LifecycleError::timeout(step))
        }
    }
}
