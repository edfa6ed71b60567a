//! Server test utilities.

use super::scanner::ScriptedScanner;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response, StatusCode};
use moada_core::config::{AppConfig, MetadataConfig, StorageConfig};
use moada_core::{ClientIdentity, ManualClock};
use moada_metadata::{MetadataStore, SqliteStore};
use moada_server::lifecycle::Lifecycle;
use moada_server::{AppState, LifecycleDeps, create_router};
use moada_storage::{FileStore, FilesystemBackend, StagingArea};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use time::macros::datetime;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub deps: LifecycleDeps,
    pub clock: Arc<ManualClock>,
    pub scanner: Arc<ScriptedScanner>,
    pub storage_root: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage_root = temp_dir.path().join("files");
        let staging_dir = temp_dir.path().join("staging");
        let db_path = temp_dir.path().join("metadata.db");

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: storage_root.clone(),
            staging_path: Some(staging_dir.clone()),
        };
        config.metadata = MetadataConfig::Sqlite {
            path: db_path.clone(),
            query_timeout_secs: 5,
        };
        modifier(&mut config);

        let storage: Arc<dyn FileStore> = Arc::new(
            FilesystemBackend::new(&storage_root)
                .await
                .expect("Failed to create storage backend"),
        );
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, 5)
                .await
                .expect("Failed to create metadata store"),
        );
        let staging = StagingArea::new(&staging_dir)
            .await
            .expect("Failed to create staging area");
        let clock = Arc::new(ManualClock::new(datetime!(2025-03-01 09:00 UTC)));
        let scanner = Arc::new(ScriptedScanner::clean());

        let deps = LifecycleDeps {
            storage,
            metadata,
            staging,
            scanner: scanner.clone(),
            clock: clock.clone(),
        };

        let state = AppState::new(config, deps.clone()).expect("Invalid test configuration");
        let router = create_router(state.clone()).expect("Failed to build router");

        Self {
            router,
            state,
            deps,
            clock,
            scanner,
            storage_root,
            _temp_dir: temp_dir,
        }
    }

    /// Swap the lifecycle behind the router.
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.state = self.state.with_lifecycle(lifecycle);
        self.router = create_router(self.state.clone()).expect("Failed to build router");
        self
    }

    /// The lifecycle behind the router.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.state.lifecycle
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the underlying storage.
    pub fn storage(&self) -> Arc<dyn FileStore> {
        self.state.storage.clone()
    }

    /// Directory of a client on disk.
    pub fn client_dir(&self, identity: &ClientIdentity) -> PathBuf {
        self.storage_root.join(identity.as_str())
    }

    /// Write a file under the storage root, bypassing the lifecycle.
    pub fn plant(&self, key: &str, data: &[u8]) {
        let path = self.storage_root.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    /// A lifecycle sharing this server's config and services, with the file
    /// store replaced.
    pub fn lifecycle_with_storage(&self, storage: Arc<dyn FileStore>) -> Lifecycle {
        let deps = LifecycleDeps {
            storage,
            ..self.deps.clone()
        };
        Lifecycle::new(&self.state.config, deps)
    }

    /// Names of every entry in a client's directory, dotfiles included.
    pub fn client_dir_entries(&self, identity: &ClientIdentity) -> Vec<String> {
        match std::fs::read_dir(self.client_dir(identity)) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => panic!("cannot read client directory: {e}"),
        }
    }

    /// Number of uploads left in the staging area.
    pub async fn staged_files(&self) -> usize {
        self.deps.staging.pending().await.unwrap()
    }

    /// Send a request as the client at `ip`.
    pub async fn send(&self, ip: &str, mut request: Request<Body>) -> Response<Body> {
        request
            .extensions_mut()
            .insert(ConnectInfo(super::fixtures::client_addr(ip)));
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a request as the client at `ip` and decode a JSON response.
    pub async fn send_json(&self, ip: &str, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.send(ip, request).await;
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let json: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
