//! Upload orchestration.

use super::error::{LifecycleError, LifecycleResult};
use super::ledger::{check_client, check_host};
use super::scanner::ScanVerdict;
use super::{Lifecycle, timed};
use crate::metrics;
use bytes::Bytes;
use moada_core::{ClientIdentity, FileIds, FileName, FileRecord, content_type, email, file_key};
use moada_metadata::MetadataError;
use moada_metadata::models::FileRow;
use moada_storage::StorageResult;
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tokio::task::JoinError;

/// An upload as received from the client.
#[derive(Debug)]
pub struct UploadRequest {
    pub identity: ClientIdentity,
    /// File name as supplied by the client.
    pub file_name: String,
    /// Declared content type.
    pub content_type: String,
    /// Optional contact address, may be blank.
    pub email: Option<String>,
    pub data: Bytes,
}

/// Successful upload result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The file was stored for the caller.
    Stored(FileRecord),
    /// Identical content under the same name is already stored.
    Deduplicated(FileRecord),
}

/// Upload progress, logged on every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UploadState {
    Received,
    TypeChecked,
    HostQuotaChecked,
    RateChecked,
    ScanStaged,
    ScanClean,
    ClientQuotaChecked,
    EmailChecked,
    IdentifiersDerived,
    DedupChecked,
    MetadataPersisted,
    BytesPersisted,
    LedgerRefreshed,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadState::Received => "received",
            UploadState::TypeChecked => "type_checked",
            UploadState::HostQuotaChecked => "quota_checked_host",
            UploadState::RateChecked => "rate_checked",
            UploadState::ScanStaged => "scan_staged",
            UploadState::ScanClean => "scan_clean",
            UploadState::ClientQuotaChecked => "quota_checked_client",
            UploadState::EmailChecked => "email_checked",
            UploadState::IdentifiersDerived => "identifiers_derived",
            UploadState::DedupChecked => "dedup_checked",
            UploadState::MetadataPersisted => "metadata_persisted",
            UploadState::BytesPersisted => "bytes_persisted",
            UploadState::LedgerRefreshed => "ledger_refreshed",
        };
        f.write_str(name)
    }
}

fn enter(state: UploadState) {
    tracing::debug!(state = %state, "Upload transition");
}

impl Lifecycle {
    /// Validate, scan, deduplicate and store an upload.
    #[tracing::instrument(
        skip(self, request),
        fields(identity = %request.identity, size = request.data.len())
    )]
    pub async fn upload(&self, request: UploadRequest) -> LifecycleResult<UploadOutcome> {
        let result = self.run_upload(request).await;
        if let Err(err) = &result {
            tracing::debug!(kind = %err.kind(), error = %err, "Upload rejected");
        }
        result
    }

    async fn run_upload(&self, request: UploadRequest) -> LifecycleResult<UploadOutcome> {
        let UploadRequest {
            identity,
            file_name,
            content_type,
            email,
            data,
        } = request;
        let size = data.len() as u64;
        let io_timeout = self.limits.io_timeout;
        enter(UploadState::Received);

        if let Err(e) = content_type::check(&content_type) {
            tracing::info!(reason = %e, "Upload refused");
            return Err(LifecycleError::not_allowed());
        }
        let name = FileName::parse(&file_name).map_err(|e| {
            tracing::info!(reason = %e, "Upload refused");
            LifecycleError::not_allowed()
        })?;
        enter(UploadState::TypeChecked);

        let host_used = self.ledger.host_usage().await?;
        metrics::HOST_USAGE_BYTES.set(i64::try_from(host_used).unwrap_or(i64::MAX));
        check_host(host_used, self.limits.host_bytes)?;
        enter(UploadState::HostQuotaChecked);

        let existing = self.metadata.client_exists(identity.as_str()).await?;
        if existing {
            self.rate_limiter.check(&identity).await?;
        }
        enter(UploadState::RateChecked);

        // Removed from the staging area when dropped, on every path below.
        let staged = timed(io_timeout, "stage upload", self.staging.stage(data.clone())).await?;
        enter(UploadState::ScanStaged);

        let started = Instant::now();
        let verdict = self.scanner.scan(staged.path()).await;
        metrics::SCAN_DURATION.observe(started.elapsed().as_secs_f64());
        match verdict {
            ScanVerdict::Clean => {}
            ScanVerdict::Infected(signature) => {
                tracing::warn!(signature = %signature, "Infected upload refused");
                return Err(LifecycleError::Infected { signature });
            }
            ScanVerdict::Error(reason) => {
                tracing::error!(scanner = self.scanner.name(), reason = %reason, "Antivirus scan failed");
                return Err(LifecycleError::ScanUnavailable(reason));
            }
        }
        enter(UploadState::ScanClean);

        let used = if existing {
            self.ledger.recompute(&identity).await?.used_space
        } else {
            0
        };
        check_client(used, size, self.limits.per_client_bytes)?;
        enter(UploadState::ClientQuotaChecked);

        let email = email::validate_optional(email.as_deref()).map_err(|e| {
            tracing::info!(reason = %e, "Upload refused");
            LifecycleError::not_allowed()
        })?;
        enter(UploadState::EmailChecked);

        let ids = FileIds::derive(&data, name.as_str(), &self.secrets);
        let key = file_key(&identity, &ids.public, name.extension());
        enter(UploadState::IdentifiersDerived);

        let bytes_here = timed(io_timeout, "check stored file", self.storage.exists(&key)).await?;
        let known = self.metadata.get_file_by_public_id(ids.public.as_str()).await?;
        match (bytes_here, known) {
            (_, Some(row)) => return self.deduplicated(row),
            (true, None) => {
                tracing::error!(
                    public_id = %ids.public,
                    key = %key,
                    "Corruption candidate: stored bytes without catalog entry"
                );
                metrics::CORRUPTION_DETECTED.inc();
                return Err(LifecycleError::Corruption(format!(
                    "file {} is stored without a catalog entry",
                    ids.public
                )));
            }
            (false, None) => {}
        }
        enter(UploadState::DedupChecked);

        let now = self.clock.now();
        let record = FileRecord {
            public_id: ids.public,
            private_id: ids.private,
            name: name.as_str().to_string(),
            size,
            saved_at: now,
            expires_at: now + self.limits.record_ttl,
            email,
        };
        match self.metadata.insert_file(&FileRow::from(&record)).await {
            Ok(()) => {}
            Err(MetadataError::AlreadyExists(_)) => {
                let row = self
                    .metadata
                    .get_file_by_public_id(record.public_id.as_str())
                    .await?
                    .ok_or_else(|| {
                        LifecycleError::Corruption(format!(
                            "identifier of {} collides with another catalog entry",
                            record.public_id
                        ))
                    })?;
                return self.deduplicated(row);
            }
            Err(e) => return Err(e.into()),
        }
        enter(UploadState::MetadataPersisted);

        self.persist(staged.path(), &key, &record).await?;
        drop(staged);
        enter(UploadState::BytesPersisted);

        if let Err(err) = self.ledger.upsert(&identity).await {
            tracing::error!(
                public_id = %record.public_id,
                error = %err,
                "Corruption candidate: usage refresh failed after commit"
            );
            metrics::CORRUPTION_DETECTED.inc();
            return Err(LifecycleError::Ledger(Box::new(err)));
        }
        enter(UploadState::LedgerRefreshed);

        metrics::UPLOADS_STORED.inc();
        metrics::BYTES_STORED.inc_by(size);
        tracing::info!(public_id = %record.public_id, size, "File stored");
        Ok(UploadOutcome::Stored(record))
    }

    fn deduplicated(&self, row: FileRow) -> LifecycleResult<UploadOutcome> {
        let record = FileRecord::try_from(row)?;
        metrics::UPLOADS_DEDUPLICATED.inc();
        tracing::info!(public_id = %record.public_id, "Upload deduplicated");
        Ok(UploadOutcome::Deduplicated(record))
    }

    /// Copy the staged upload to its final key.
    ///
    /// The copy runs on its own task and is never abandoned midway. When it
    /// outlives the I/O timeout the upload still waits for it to settle, so
    /// that whatever landed is removed before the catalog entry is dropped.
    async fn persist(&self, source: &Path, key: &str, record: &FileRecord) -> LifecycleResult<()> {
        let limit = self.limits.io_timeout;
        let mut write = {
            let storage = self.storage.clone();
            let source = source.to_path_buf();
            let key = key.to_string();
            tokio::spawn(async move { storage.copy_from_path(&source, &key).await })
        };

        let result = match tokio::time::timeout(limit, &mut write).await {
            Ok(joined) => settled(joined),
            Err(_) => {
                tracing::warn!(
                    step = "store file",
                    timeout_secs = limit.as_secs(),
                    "Step timed out, waiting for the write to settle"
                );
                if let Err(e) = settled(write.await) {
                    tracing::debug!(error = %e, "Timed out write failed");
                }
                Err(LifecycleError::timeout("store file"))
            }
        };

        if let Err(err) = result {
            self.discard_stored_bytes(key, record).await;
            self.discard_catalog_entry(record).await;
            return Err(err);
        }
        Ok(())
    }

    /// Remove bytes a failed store step may have left at `key`.
    async fn discard_stored_bytes(&self, key: &str, record: &FileRecord) {
        match timed(
            self.limits.io_timeout,
            "remove stored file",
            self.storage.delete(key),
        )
        .await
        {
            Ok(()) => {
                tracing::info!(public_id = %record.public_id, "Removed bytes of a failed store step");
            }
            Err(LifecycleError::Storage(e)) if e.is_not_found() => {}
            Err(e) => {
                tracing::error!(
                    public_id = %record.public_id,
                    key = %key,
                    error = %e,
                    "Corruption candidate: stored bytes without catalog entry"
                );
                metrics::CORRUPTION_DETECTED.inc();
            }
        }
    }

    /// Drop the catalog entry of an upload whose bytes could not be stored.
    async fn discard_catalog_entry(&self, record: &FileRecord) {
        if let Err(e) = self
            .metadata
            .delete_file_by_private_id(record.private_id.as_str())
            .await
        {
            tracing::error!(
                public_id = %record.public_id,
                error = %e,
                "Corruption candidate: catalog entry without stored bytes"
            );
            metrics::CORRUPTION_DETECTED.inc();
        }
    }
}

/// Outcome of a store task that ran to completion or panicked.
fn settled(joined: Result<StorageResult<u64>, JoinError>) -> LifecycleResult<()> {
    match joined {
        Ok(written) => written.map(|_| ()).map_err(Into::into),
        Err(e) => Err(LifecycleError::Storage(moada_storage::StorageError::Io(
            std::io::Error::other(format!("store task failed: {e}")),
        ))),
    }
}
