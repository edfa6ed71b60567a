//! Per-client and host usage accounting.
//!
//! Usage is never tracked with running counters. Every read lists the
//! client's directory and resolves each stored file in the catalog, so the
//! filesystem stays the single source of truth and drift between disk and
//! catalog surfaces as an error instead of being absorbed.

use super::error::{LifecycleError, LifecycleResult, QuotaScope};
use super::timed;
use async_trait::async_trait;
use moada_core::{Clock, ClientIdentity, ClientRecord, PublicId, Usage};
use moada_metadata::MetadataStore;
use moada_metadata::models::{ClientRow, FileRow, encode_file_ids};
use moada_metadata::MetadataError;
use moada_storage::FileStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Usage accounting for clients and the host.
#[async_trait]
pub trait QuotaLedger: Send + Sync + 'static {
    /// Recompute a client's usage from its directory.
    async fn recompute(&self, identity: &ClientIdentity) -> LifecycleResult<Usage>;

    /// Create or refresh the client's record from a fresh recompute.
    async fn upsert(&self, identity: &ClientIdentity) -> LifecycleResult<ClientRecord>;

    /// Total bytes stored on the host.
    async fn host_usage(&self) -> LifecycleResult<u64>;
}

/// Reject when the host is at or above its cap.
pub fn check_host(used: u64, cap: u64) -> LifecycleResult<()> {
    if used >= cap {
        return Err(LifecycleError::QuotaExceeded {
            scope: QuotaScope::Host,
            remaining: 0,
        });
    }
    Ok(())
}

/// Reject when `incoming` bytes would push the client past its cap.
pub fn check_client(used: u64, incoming: u64, cap: u64) -> LifecycleResult<()> {
    if used.saturating_add(incoming) > cap {
        return Err(LifecycleError::QuotaExceeded {
            scope: QuotaScope::Client,
            remaining: cap.saturating_sub(used),
        });
    }
    Ok(())
}

/// Ledger that reconciles the client directory against the catalog.
pub struct ReconcilingLedger {
    storage: Arc<dyn FileStore>,
    metadata: Arc<dyn MetadataStore>,
    clock: Arc<dyn Clock>,
    record_ttl: time::Duration,
    io_timeout: Duration,
}

impl ReconcilingLedger {
    pub fn new(
        storage: Arc<dyn FileStore>,
        metadata: Arc<dyn MetadataStore>,
        clock: Arc<dyn Clock>,
        record_ttl: time::Duration,
        io_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            metadata,
            clock,
            record_ttl,
            io_timeout,
        }
    }
}

#[async_trait]
impl QuotaLedger for ReconcilingLedger {
    #[tracing::instrument(skip(self), fields(identity = %identity))]
    async fn recompute(&self, identity: &ClientIdentity) -> LifecycleResult<Usage> {
        let mut listing = timed(
            self.io_timeout,
            "list client directory",
            self.storage.list_dir(identity.as_str()),
        )
        .await
        .map_err(|err| match err {
            LifecycleError::Storage(source) => LifecycleError::DirectoryUnreadable {
                identity: identity.to_string(),
                source,
            },
            other => other,
        })?;
        listing.sort_by(|a, b| a.name.cmp(&b.name));

        let mut ids = Vec::with_capacity(listing.len());
        for entry in &listing {
            let id = PublicId::from_stored_name(&entry.name).map_err(|_| {
                orphan(identity, &entry.name)
            })?;
            ids.push(id);
        }

        let lookup: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let rows: HashMap<String, FileRow> = self
            .metadata
            .get_files_by_public_ids(&lookup)
            .await?
            .into_iter()
            .map(|row| (row.public_id.clone(), row))
            .collect();

        let mut entries = Vec::with_capacity(ids.len());
        for (id, entry) in ids.into_iter().zip(&listing) {
            let Some(row) = rows.get(id.as_str()) else {
                return Err(orphan(identity, &entry.name));
            };
            entries.push((id, u64::try_from(row.size).unwrap_or_default()));
        }

        let usage = Usage::from_entries(entries);
        tracing::debug!(
            files = usage.files_count,
            used_space = usage.used_space,
            "Recomputed client usage"
        );
        Ok(usage)
    }

    #[tracing::instrument(skip(self), fields(identity = %identity))]
    async fn upsert(&self, identity: &ClientIdentity) -> LifecycleResult<ClientRecord> {
        let usage = self.recompute(identity).await?;
        let now = self.clock.now();
        let expires_at = now + self.record_ttl;
        let used_space = i64::try_from(usage.used_space).unwrap_or(i64::MAX);

        if !self.metadata.client_exists(identity.as_str()).await? {
            let row = ClientRow {
                identity: identity.to_string(),
                files: encode_file_ids(usage.files.iter().map(PublicId::as_str))?,
                files_count: i64::try_from(usage.files_count).unwrap_or(i64::MAX),
                used_space,
                created_at: now,
                expires_at,
                api_calls: 1,
                last_call_at: now,
            };
            match self.metadata.create_client(&row).await {
                Ok(()) => {
                    tracing::info!(files = usage.files_count, "Client record created");
                    return Ok(ClientRecord::try_from(row)?);
                }
                // Lost a creation race; refresh the winner's record instead.
                Err(MetadataError::AlreadyExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let files: Vec<String> = usage.files.iter().map(|id| id.to_string()).collect();
        self.metadata
            .update_client_usage(identity.as_str(), &files, used_space, expires_at)
            .await?;

        let row = self
            .metadata
            .get_client(identity.as_str())
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("client {identity}")))?;
        Ok(ClientRecord::try_from(row)?)
    }

    async fn host_usage(&self) -> LifecycleResult<u64> {
        timed(self.io_timeout, "scan host usage", self.storage.total_size()).await
    }
}

fn orphan(identity: &ClientIdentity, file: &str) -> LifecycleError {
    tracing::error!(
        identity = %identity,
        file = %file,
        "Orphan file: no catalog entry for stored file"
    );
    crate::metrics::CORRUPTION_DETECTED.inc();
    LifecycleError::OrphanFile {
        identity: identity.to_string(),
        file: file.to_string(),
    }
}
