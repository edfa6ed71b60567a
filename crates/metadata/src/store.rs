//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{ClientRepo, FileRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: FileRepo + ClientRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Create a new SQLite store, creating the database file if missing.
    pub async fn new(path: impl AsRef<Path>, query_timeout_secs: u64) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single connection serializes writers; each statement stays atomic.
            .max_connections(1)
            .acquire_timeout(query_timeout)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout,
        };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), query_timeout_secs, "SQLite metadata store ready");
        Ok(store)
    }

    /// Override the per-statement timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run a statement under the configured timeout.
    async fn timed<T, F>(&self, op: &'static str, fut: F) -> MetadataResult<T>
    where
        F: Future<Output = MetadataResult<T>> + Send,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    op,
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "metadata statement timed out"
                );
                Err(MetadataError::Timeout(format!("metadata {op}")))
            }
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.timed("health_check", async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }
}

// Implement the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;

    /// SQLite caps bound parameters at 999 per statement.
    const BATCH_SIZE: usize = 900;

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn insert_file(&self, file: &FileRow) -> MetadataResult<()> {
            self.timed("insert_file", async {
                sqlx::query(
                    "INSERT INTO files (public_id, private_id, name, size, saved_at, expires_at, email) \
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&file.public_id)
                .bind(&file.private_id)
                .bind(&file.name)
                .bind(file.size)
                .bind(file.saved_at)
                .bind(file.expires_at)
                .bind(&file.email)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    MetadataError::from_insert(e, || format!("file {}", file.public_id))
                })?;
                Ok(())
            })
            .await
        }

        async fn get_file_by_public_id(&self, public_id: &str) -> MetadataResult<Option<FileRow>> {
            self.timed("get_file_by_public_id", async {
                let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE public_id = ?")
                    .bind(public_id)
                    .fetch_optional(&self.pool)
                    .await?;
                Ok(row)
            })
            .await
        }

        async fn get_file_by_private_id(
            &self,
            private_id: &str,
        ) -> MetadataResult<Option<FileRow>> {
            self.timed("get_file_by_private_id", async {
                let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE private_id = ?")
                    .bind(private_id)
                    .fetch_optional(&self.pool)
                    .await?;
                Ok(row)
            })
            .await
        }

        async fn get_files_by_public_ids(
            &self,
            public_ids: &[String],
        ) -> MetadataResult<Vec<FileRow>> {
            if public_ids.is_empty() {
                return Ok(Vec::new());
            }

            self.timed("get_files_by_public_ids", async {
                let mut result = Vec::with_capacity(public_ids.len());
                for batch in public_ids.chunks(BATCH_SIZE) {
                    let placeholders: Vec<&str> = batch.iter().map(|_| "?").collect();
                    let query = format!(
                        "SELECT * FROM files WHERE public_id IN ({})",
                        placeholders.join(", ")
                    );

                    let mut query_builder = sqlx::query_as::<_, FileRow>(&query);
                    for id in batch {
                        query_builder = query_builder.bind(id);
                    }
                    result.extend(query_builder.fetch_all(&self.pool).await?);
                }
                Ok(result)
            })
            .await
        }

        async fn delete_file_by_private_id(&self, private_id: &str) -> MetadataResult<FileRow> {
            self.timed("delete_file_by_private_id", async {
                sqlx::query_as::<_, FileRow>("DELETE FROM files WHERE private_id = ? RETURNING *")
                    .bind(private_id)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or_else(|| MetadataError::NotFound(format!("private id {private_id}")))
            })
            .await
        }
    }

    #[async_trait]
    impl ClientRepo for SqliteStore {
        async fn client_exists(&self, identity: &str) -> MetadataResult<bool> {
            self.timed("client_exists", async {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM clients WHERE identity = ?)",
                )
                .bind(identity)
                .fetch_one(&self.pool)
                .await?;
                Ok(exists)
            })
            .await
        }

        async fn get_client(&self, identity: &str) -> MetadataResult<Option<ClientRow>> {
            self.timed("get_client", async {
                let row = sqlx::query_as::<_, ClientRow>("SELECT * FROM clients WHERE identity = ?")
                    .bind(identity)
                    .fetch_optional(&self.pool)
                    .await?;
                Ok(row)
            })
            .await
        }

        async fn create_client(&self, client: &ClientRow) -> MetadataResult<()> {
            self.timed("create_client", async {
                sqlx::query(
                    "INSERT INTO clients (identity, files, files_count, used_space, created_at, expires_at, api_calls, last_call_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&client.identity)
                .bind(&client.files)
                .bind(client.files_count)
                .bind(client.used_space)
                .bind(client.created_at)
                .bind(client.expires_at)
                .bind(client.api_calls)
                .bind(client.last_call_at)
                .execute(&self.pool)
                .await
                .map_err(|e| MetadataError::from_insert(e, || format!("client {}", client.identity)))?;
                Ok(())
            })
            .await
        }

        async fn update_client_usage(
            &self,
            identity: &str,
            files: &[String],
            used_space: i64,
            expires_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let encoded = encode_file_ids(files.iter().map(String::as_str))?;
            let files_count = i64::try_from(files.len()).unwrap_or(i64::MAX);

            self.timed("update_client_usage", async {
                let result = sqlx::query(
                    "UPDATE clients SET files = ?, files_count = ?, used_space = ?, expires_at = ? \
                     WHERE identity = ?",
                )
                .bind(&encoded)
                .bind(files_count)
                .bind(used_space)
                .bind(expires_at)
                .bind(identity)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(MetadataError::NotFound(format!("client {identity}")));
                }
                Ok(())
            })
            .await
        }

        async fn update_client_calls(
            &self,
            identity: &str,
            api_calls: i64,
            last_call_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            self.timed("update_client_calls", async {
                let result = sqlx::query(
                    "UPDATE clients SET api_calls = ?, last_call_at = ? WHERE identity = ?",
                )
                .bind(api_calls)
                .bind(last_call_at)
                .bind(identity)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(MetadataError::NotFound(format!("client {identity}")));
                }
                Ok(())
            })
            .await
        }

        async fn delete_client(&self, identity: &str) -> MetadataResult<()> {
            self.timed("delete_client", async {
                let result = sqlx::query("DELETE FROM clients WHERE identity = ?")
                    .bind(identity)
                    .execute(&self.pool)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(MetadataError::NotFound(format!("client {identity}")));
                }
                Ok(())
            })
            .await
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- File catalog: both identifiers are unique
CREATE TABLE IF NOT EXISTS files (
    public_id TEXT PRIMARY KEY,
    private_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    size INTEGER NOT NULL CHECK (size >= 0),
    saved_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    email TEXT
);
CREATE INDEX IF NOT EXISTS idx_files_expires_at ON files(expires_at);

-- Anonymous clients, keyed by address hash
CREATE TABLE IF NOT EXISTS clients (
    identity TEXT PRIMARY KEY,
    files TEXT NOT NULL DEFAULT '[]',
    files_count INTEGER NOT NULL DEFAULT 0,
    used_space INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    api_calls INTEGER NOT NULL DEFAULT 0,
    last_call_at TEXT NOT NULL
);
"#;
