//! Application state shared across handlers.

use crate::client_ip::ClientResolver;
use crate::lifecycle::{Lifecycle, LifecycleDeps};
use moada_core::config::AppConfig;
use moada_metadata::MetadataStore;
use moada_storage::FileStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// File lifecycle orchestration.
    pub lifecycle: Arc<Lifecycle>,
    /// File storage backend.
    pub storage: Arc<dyn FileStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Client address resolution.
    pub client_resolver: ClientResolver,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Validates the configuration, logging warnings for risky settings.
    pub fn new(config: AppConfig, deps: LifecycleDeps) -> Result<Self, String> {
        for warning in config.validate()? {
            tracing::warn!("Configuration warning: {}", warning);
        }

        let client_resolver = ClientResolver::new(&config.server)?;
        let storage = deps.storage.clone();
        let metadata = deps.metadata.clone();
        let lifecycle = Lifecycle::new(&config, deps);

        Ok(Self {
            config: Arc::new(config),
            lifecycle: Arc::new(lifecycle),
            storage,
            metadata,
            client_resolver,
        })
    }

    /// Replace the lifecycle, keeping everything else.
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Arc::new(lifecycle);
        self
    }
}
