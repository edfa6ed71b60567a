//! MOADA server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use moada_core::SystemClock;
use moada_core::config::AppConfig;
use moada_server::lifecycle::scanner::scanner_from_config;
use moada_server::{AppState, LifecycleDeps, create_router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// MOADA - An anonymous file drop
#[derive(Parser, Debug)]
#[command(name = "moadad")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MOADA_CONFIG", default_value = "config/server.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("MOADA v{}", env!("CARGO_PKG_VERSION"));

    // The file is optional; env vars can provide or override everything.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    // MOADA_CONFIG only carries the path.
    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("MOADA_") && key != "MOADA_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: moadad --config /path/to/config.toml\n  \
             2. Environment variables: MOADA_SECRETS__PRIMARY=... \
             MOADA_SECRETS__EXCLUSION=... moadad\n\n\
             See config/server.example.toml for example configuration.\n\
             Set MOADA_CONFIG env var to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("MOADA_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    moada_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = moada_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    let staging = moada_storage::staging_from_config(&config.storage)
        .await
        .context("failed to initialize staging area")?;
    let stale = staging.pending().await.unwrap_or_default();
    if stale > 0 {
        tracing::warn!(
            count = stale,
            dir = %staging.dir().display(),
            "Staging directory holds leftovers from a previous run"
        );
    }
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    let metadata = moada_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let scanner = scanner_from_config(&config.scanner).map_err(anyhow::Error::msg)?;
    match scanner.health_check().await {
        Ok(()) => tracing::info!(scanner = scanner.name(), "Antivirus scanner reachable"),
        // Uploads fail closed until the scanner comes back.
        Err(e) => tracing::warn!(scanner = scanner.name(), error = %e, "Antivirus scanner unreachable"),
    }

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind))?;

    let deps = LifecycleDeps {
        storage,
        metadata,
        staging,
        scanner,
        clock: Arc::new(SystemClock),
    };
    let state = AppState::new(config, deps).map_err(anyhow::Error::msg)?;
    let app = create_router(state).map_err(anyhow::Error::msg)?;

    tracing::info!("Listening on {}", addr);

    // ConnectInfo feeds client address resolution.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
