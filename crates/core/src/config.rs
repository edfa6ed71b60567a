//! Configuration types shared across crates.

use crate::file_id::Secrets;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8082").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Origin allowed by CORS. Requests carrying any other `Origin` are
    /// served but logged. When unset, CORS is not applied.
    #[serde(default)]
    pub allowed_origin: Option<String>,
    /// Header carrying the client address when behind a proxy or CDN.
    #[serde(default = "default_client_ip_header")]
    pub client_ip_header: String,
    /// Trusted proxy IP addresses/CIDR ranges.
    /// Only requests from these peers have `client_ip_header` or
    /// X-Forwarded-For honoured. Use ["*"] to trust all peers
    /// (NOT recommended for production).
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Maximum accepted request body for uploads, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Timeout for individual filesystem steps, in seconds.
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8082".to_string()
}

fn default_client_ip_header() -> String {
    "CF-Connecting-IP".to_string()
}

fn default_max_upload_bytes() -> u64 {
    crate::DEFAULT_PER_CLIENT_BYTES + 1024 * 1024 // cap plus multipart overhead
}

fn default_io_timeout_secs() -> u64 {
    30
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origin: None,
            client_ip_header: default_client_ip_header(),
            trusted_proxies: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
            io_timeout_secs: default_io_timeout_secs(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Timeout applied to each filesystem step.
    pub fn io_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.io_timeout_secs)
    }

    /// Validate server settings, returning warnings for risky values.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.io_timeout_secs == 0 {
            return Err("server.io_timeout_secs cannot be 0".to_string());
        }
        if self.client_ip_header.trim().is_empty() {
            return Err("server.client_ip_header cannot be empty".to_string());
        }
        if self.trusted_proxies.len() == 1 && self.trusted_proxies[0] == "*" {
            warnings.push(
                "server.trusted_proxies=['*'] trusts client address headers from every peer. \
                 Clients can spoof their address and bypass quotas and rate limits. \
                 Only use this setting behind a reverse proxy that overwrites the header."
                    .to_string(),
            );
        }
        if self.allowed_origin.is_none() {
            warnings.push(
                "server.allowed_origin is not set; browsers on other origins cannot call the API"
                    .to_string(),
            );
        }

        Ok(warnings)
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory holding one directory per client.
        path: PathBuf,
        /// Directory for uploads awaiting a scan verdict.
        /// Defaults to a sibling of `path` named `staging`.
        #[serde(default)]
        staging_path: Option<PathBuf>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/files"),
            staging_path: None,
        }
    }
}

impl StorageConfig {
    /// Resolve the staging directory.
    pub fn staging_dir(&self) -> PathBuf {
        match self {
            StorageConfig::Filesystem { path, staging_path } => {
                staging_path.clone().unwrap_or_else(|| {
                    path.parent()
                        .map(|p| p.join("staging"))
                        .unwrap_or_else(|| PathBuf::from("staging"))
                })
            }
        }
    }

    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path, .. } => {
                let staging = self.staging_dir();
                if staging.starts_with(path) {
                    return Err(format!(
                        "storage.staging_path {} must not be inside storage.path {}; \
                         staged uploads would count towards host usage",
                        staging.display(),
                        path.display()
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Per-statement timeout in seconds. A statement that exceeds it
        /// fails the operation.
        #[serde(default = "default_query_timeout_secs")]
        query_timeout_secs: u64,
    },
}

fn default_query_timeout_secs() -> u64 {
    10
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite {
                query_timeout_secs, ..
            } if *query_timeout_secs == 0 => {
                Err("metadata.query_timeout_secs cannot be 0".to_string())
            }
            MetadataConfig::Sqlite { .. } => Ok(()),
        }
    }
}

/// Storage quota configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Bytes each client may keep stored.
    #[serde(default = "default_per_client_bytes")]
    pub per_client_bytes: u64,
    /// Bytes the whole host may keep stored.
    #[serde(default = "default_host_bytes")]
    pub host_bytes: u64,
    /// Lifetime of file and client records, in seconds.
    #[serde(default = "default_record_ttl_secs")]
    pub record_ttl_secs: u64,
}

fn default_per_client_bytes() -> u64 {
    crate::DEFAULT_PER_CLIENT_BYTES
}

fn default_host_bytes() -> u64 {
    crate::DEFAULT_PER_CLIENT_BYTES * crate::HOST_CAP_MULTIPLIER
}

fn default_record_ttl_secs() -> u64 {
    crate::DEFAULT_RECORD_TTL_SECS
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            per_client_bytes: default_per_client_bytes(),
            host_bytes: default_host_bytes(),
            record_ttl_secs: default_record_ttl_secs(),
        }
    }
}

impl QuotaConfig {
    /// Record lifetime as a Duration.
    pub fn record_ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        Duration::seconds(i64::try_from(self.record_ttl_secs).unwrap_or(i64::MAX))
    }

    /// Validate quota settings, returning warnings for suspicious values.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.per_client_bytes == 0 {
            return Err("quota.per_client_bytes cannot be 0".to_string());
        }
        if self.record_ttl_secs == 0 {
            return Err("quota.record_ttl_secs cannot be 0".to_string());
        }
        if self.host_bytes < self.per_client_bytes {
            warnings.push(format!(
                "quota.host_bytes={} is smaller than quota.per_client_bytes={}; \
                 a single client can exhaust the host",
                self.host_bytes, self.per_client_bytes
            ));
        }

        Ok(warnings)
    }
}

/// Per-client rate limiting configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting (default: true).
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Calls allowed per window.
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,
    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_max_calls() -> u32 {
    crate::DEFAULT_MAX_CALLS
}

fn default_window_secs() -> u64 {
    crate::DEFAULT_WINDOW_SECS
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            max_calls: default_max_calls(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Window length as a Duration.
    pub fn window(&self) -> Duration {
        Duration::seconds(i64::try_from(self.window_secs).unwrap_or(i64::MAX))
    }

    /// Validate rate limit configuration.
    /// Returns warnings for configs that are permissive but allowed.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if !self.enabled {
            warnings.push(
                "rate_limit.enabled=false: uploads from a single client are unthrottled"
                    .to_string(),
            );
            return Ok(warnings);
        }
        if self.window_secs == 0 {
            return Err("rate_limit.window_secs cannot be 0".to_string());
        }
        if self.max_calls == 0 {
            return Err(
                "rate_limit.max_calls cannot be 0; disable rate limiting instead".to_string(),
            );
        }

        Ok(warnings)
    }
}

/// Antivirus scanner configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScannerConfig {
    /// ClamAV daemon reached over a Unix socket or TCP.
    Clamd {
        /// Unix socket path (e.g. /var/run/clamav/clamd.ctl).
        #[serde(default)]
        socket: Option<PathBuf>,
        /// TCP address (e.g. 127.0.0.1:3310).
        #[serde(default)]
        address: Option<String>,
        /// Scan timeout in seconds.
        #[serde(default = "default_scan_timeout_secs")]
        timeout_secs: u64,
    },
    /// Every file is reported clean (development only).
    Disabled,
}

fn default_scan_timeout_secs() -> u64 {
    60
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self::Clamd {
            socket: Some(PathBuf::from("/var/run/clamav/clamd.ctl")),
            address: None,
            timeout_secs: default_scan_timeout_secs(),
        }
    }
}

impl ScannerConfig {
    /// Validate scanner configuration invariants.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        match self {
            ScannerConfig::Clamd {
                socket,
                address,
                timeout_secs,
            } => {
                if *timeout_secs == 0 {
                    return Err("scanner.timeout_secs cannot be 0".to_string());
                }
                match (socket, address) {
                    (Some(_), None) | (None, Some(_)) => Ok(Vec::new()),
                    _ => Err("clamd scanner requires exactly one of 'socket' or 'address'"
                        .to_string()),
                }
            }
            ScannerConfig::Disabled => Ok(vec![
                "scanner.type=disabled: uploads are stored without an antivirus scan".to_string(),
            ]),
        }
    }
}

/// Secret material for identifier derivation.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Mixed into both identifiers.
    pub primary: String,
    /// Mixed into the private identifier only.
    pub exclusion: String,
}

impl SecretsConfig {
    /// Create a test configuration with fixed secrets.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            primary: "test-primary-secret".to_string(),
            exclusion: "test-exclusion-secret".to_string(),
        }
    }

    /// Build the runtime secrets.
    pub fn to_secrets(&self) -> Secrets {
        Secrets::new(&self.primary, &self.exclusion)
    }

    /// Validate secret material.
    pub fn validate(&self) -> Result<(), String> {
        if self.primary.trim().is_empty() || self.exclusion.trim().is_empty() {
            return Err("secrets.primary and secrets.exclusion must be set".to_string());
        }
        if self.primary == self.exclusion {
            return Err("secrets.primary and secrets.exclusion must differ".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("primary", &"<redacted>")
            .field("exclusion", &"<redacted>")
            .finish()
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Storage quotas.
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Antivirus scanner.
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Identifier secrets (required).
    pub secrets: SecretsConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata,
    /// fixed secrets and no scanner.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            quota: QuotaConfig::default(),
            rate_limit: RateLimitConfig::default(),
            scanner: ScannerConfig::Disabled,
            secrets: SecretsConfig::for_testing(),
        }
    }

    /// Validate every section, collecting warnings.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = self.server.validate()?;
        self.storage.validate()?;
        self.metadata.validate()?;
        warnings.extend(self.quota.validate()?);
        warnings.extend(self.rate_limit.validate()?);
        warnings.extend(self.scanner.validate()?);
        self.secrets.validate()?;
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_limits() {
        let quota = QuotaConfig::default();
        assert_eq!(quota.per_client_bytes, 75 * 1024 * 1024);
        assert_eq!(quota.host_bytes, 68 * 75 * 1024 * 1024);
        assert_eq!(quota.record_ttl(), Duration::days(1));

        let rate = RateLimitConfig::default();
        assert!(rate.enabled);
        assert_eq!(rate.max_calls, 5);
        assert_eq!(rate.window(), Duration::minutes(1));
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.client_ip_header, "CF-Connecting-IP");
        assert!(config.metrics_enabled);
        assert!(config.trusted_proxies.is_empty());
    }

    #[test]
    fn test_app_config_requires_secrets() {
        let json = r#"{"server": {"bind": "0.0.0.0:8082"}}"#;
        assert!(serde_json::from_str::<AppConfig>(json).is_err());

        let json = r#"{"secrets": {"primary": "a", "exclusion": "b"}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.quota.per_client_bytes, crate::DEFAULT_PER_CLIENT_BYTES);
    }

    #[test]
    fn test_secrets_validation() {
        assert!(SecretsConfig::for_testing().validate().is_ok());

        let same = SecretsConfig {
            primary: "x".to_string(),
            exclusion: "x".to_string(),
        };
        assert!(same.validate().is_err());

        let blank = SecretsConfig {
            primary: " ".to_string(),
            exclusion: "x".to_string(),
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_secrets_debug_redacted() {
        let out = format!("{:?}", SecretsConfig::for_testing());
        assert!(!out.contains("test-primary-secret"));
    }

    #[test]
    fn test_scanner_config_requires_one_endpoint() {
        let both = ScannerConfig::Clamd {
            socket: Some(PathBuf::from("/tmp/clamd.sock")),
            address: Some("127.0.0.1:3310".to_string()),
            timeout_secs: 10,
        };
        assert!(both.validate().is_err());

        let neither = ScannerConfig::Clamd {
            socket: None,
            address: None,
            timeout_secs: 10,
        };
        assert!(neither.validate().is_err());

        assert!(ScannerConfig::default().validate().unwrap().is_empty());
        assert_eq!(ScannerConfig::Disabled.validate().unwrap().len(), 1);
    }

    #[test]
    fn test_scanner_config_tagged() {
        let json = r#"{"type": "clamd", "address": "127.0.0.1:3310"}"#;
        let config: ScannerConfig = serde_json::from_str(json).unwrap();
        match config {
            ScannerConfig::Clamd {
                address,
                timeout_secs,
                ..
            } => {
                assert_eq!(address.as_deref(), Some("127.0.0.1:3310"));
                assert_eq!(timeout_secs, 60);
            }
            _ => panic!("expected clamd config"),
        }
    }

    #[test]
    fn test_staging_dir_defaults_outside_root() {
        let config = StorageConfig::Filesystem {
            path: PathBuf::from("/srv/moada/files"),
            staging_path: None,
        };
        assert_eq!(config.staging_dir(), PathBuf::from("/srv/moada/staging"));
        assert!(config.validate().is_ok());

        let nested = StorageConfig::Filesystem {
            path: PathBuf::from("/srv/moada/files"),
            staging_path: Some(PathBuf::from("/srv/moada/files/tmp")),
        };
        assert!(nested.validate().is_err());
    }

    #[test]
    fn test_wildcard_proxy_warns() {
        let config = ServerConfig {
            trusted_proxies: vec!["*".to_string()],
            allowed_origin: Some("https://moada.example".to_string()),
            ..ServerConfig::default()
        };
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("trusted_proxies"));
    }

    #[test]
    fn test_rate_limit_zero_window_rejected() {
        let config = RateLimitConfig {
            window_secs: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
