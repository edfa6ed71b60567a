//! Quota ledger test double.

use async_trait::async_trait;
use moada_core::{ClientIdentity, ClientRecord, Usage};
use moada_metadata::MetadataError;
use moada_server::LifecycleDeps;
use moada_server::lifecycle::{LifecycleError, LifecycleResult, QuotaLedger, ReconcilingLedger};
use std::time::Duration;

/// Ledger that reads usage normally but never manages to refresh a record.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct BrokenLedger {
    inner: ReconcilingLedger,
}

#[allow(dead_code)]
impl BrokenLedger {
    pub fn new(deps: &LifecycleDeps) -> Self {
        Self {
            inner: ReconcilingLedger::new(
                deps.storage.clone(),
                deps.metadata.clone(),
                deps.clock.clone(),
                time::Duration::days(1),
                Duration::from_secs(5),
            ),
        }
    }
}

#[async_trait]
impl QuotaLedger for BrokenLedger {
    async fn recompute(&self, identity: &ClientIdentity) -> LifecycleResult<Usage> {
        self.inner.recompute(identity).await
    }

    async fn upsert(&self, _identity: &ClientIdentity) -> LifecycleResult<ClientRecord> {
        Err(LifecycleError::Metadata(MetadataError::Internal(
            "disk full".to_string(),
        )))
    }

    async fn host_usage(&self) -> LifecycleResult<u64> {
        self.inner.host_usage().await
    }
}
