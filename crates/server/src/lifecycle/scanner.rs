//! Antivirus scanning of staged uploads.
//!
//! Scanning is fail-closed: anything other than an explicit clean verdict
//! keeps the upload out of storage.

use async_trait::async_trait;
use moada_core::config::ScannerConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes sent per INSTREAM chunk.
const CHUNK_SIZE: usize = 64 * 1024;

/// Longest reply accepted from clamd.
const MAX_REPLY_LEN: usize = 4096;

/// Result of scanning one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    /// Malware found, with the reported signature name.
    Infected(String),
    /// The scan could not complete.
    Error(String),
}

/// Antivirus scanner.
#[async_trait]
pub trait Scanner: Send + Sync + 'static {
    /// Scan the file at `path`.
    async fn scan(&self, path: &Path) -> ScanVerdict;

    /// Scanner name for logs.
    fn name(&self) -> &'static str;

    /// Check that the scanner is reachable.
    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Build the scanner described by the configuration.
pub fn scanner_from_config(config: &ScannerConfig) -> Result<Arc<dyn Scanner>, String> {
    config.validate()?;

    match config {
        ScannerConfig::Clamd {
            socket,
            address,
            timeout_secs,
        } => {
            let endpoint = match (socket, address) {
                (Some(socket), None) => ClamdEndpoint::Unix(socket.clone()),
                (None, Some(address)) => ClamdEndpoint::Tcp(address.clone()),
                _ => return Err("clamd scanner requires exactly one endpoint".to_string()),
            };
            Ok(Arc::new(ClamdScanner::new(
                endpoint,
                Duration::from_secs(*timeout_secs),
            )))
        }
        ScannerConfig::Disabled => Ok(Arc::new(DisabledScanner)),
    }
}

/// Where clamd listens.
#[derive(Clone, Debug)]
pub enum ClamdEndpoint {
    Unix(PathBuf),
    Tcp(String),
}

/// Scanner talking to a ClamAV daemon with the `zINSTREAM` command.
#[derive(Clone, Debug)]
pub struct ClamdScanner {
    endpoint: ClamdEndpoint,
    timeout: Duration,
}

impl ClamdScanner {
    pub fn new(endpoint: ClamdEndpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    async fn command(&self, path: Option<&Path>) -> std::io::Result<String> {
        match &self.endpoint {
            ClamdEndpoint::Tcp(address) => {
                let conn = tokio::net::TcpStream::connect(address).await?;
                exchange(conn, path).await
            }
            #[cfg(unix)]
            ClamdEndpoint::Unix(socket) => {
                let conn = tokio::net::UnixStream::connect(socket).await?;
                exchange(conn, path).await
            }
            #[cfg(not(unix))]
            ClamdEndpoint::Unix(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            )),
        }
    }
}

#[async_trait]
impl Scanner for ClamdScanner {
    async fn scan(&self, path: &Path) -> ScanVerdict {
        match tokio::time::timeout(self.timeout, self.command(Some(path))).await {
            Ok(Ok(reply)) => parse_reply(&reply),
            Ok(Err(e)) => ScanVerdict::Error(format!("clamd: {e}")),
            Err(_) => ScanVerdict::Error(format!(
                "clamd did not answer within {}s",
                self.timeout.as_secs()
            )),
        }
    }

    fn name(&self) -> &'static str {
        "clamd"
    }

    async fn health_check(&self) -> Result<(), String> {
        match tokio::time::timeout(self.timeout, self.command(None)).await {
            Ok(Ok(reply)) if reply == "PONG" => Ok(()),
            Ok(Ok(reply)) => Err(format!("unexpected clamd reply: {reply}")),
            Ok(Err(e)) => Err(format!("clamd: {e}")),
            Err(_) => Err("clamd ping timed out".to_string()),
        }
    }
}

/// Send `zINSTREAM` with the file at `path`, or `zPING` when `path` is
/// `None`, and read the NUL-terminated reply.
async fn exchange<S>(mut conn: S, path: Option<&Path>) -> std::io::Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match path {
        None => conn.write_all(b"zPING\0").await?,
        Some(path) => {
            let mut file = tokio::fs::File::open(path).await?;
            conn.write_all(b"zINSTREAM\0").await?;

            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                // n <= CHUNK_SIZE, well within u32.
                conn.write_all(&(n as u32).to_be_bytes()).await?;
                conn.write_all(&buf[..n]).await?;
            }
            conn.write_all(&0u32.to_be_bytes()).await?;
        }
    }
    conn.flush().await?;

    let mut reply = Vec::new();
    let mut byte = [0u8; 1];
    while reply.len() < MAX_REPLY_LEN {
        if conn.read(&mut byte).await? == 0 || byte[0] == 0 {
            break;
        }
        reply.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&reply).trim().to_string())
}

/// Interpret a clamd reply such as `stream: OK` or
/// `stream: Eicar-Test-Signature FOUND`.
pub fn parse_reply(reply: &str) -> ScanVerdict {
    let body = reply.strip_prefix("stream:").unwrap_or(reply).trim();

    if body == "OK" {
        ScanVerdict::Clean
    } else if let Some(signature) = body.strip_suffix("FOUND") {
        ScanVerdict::Infected(signature.trim().to_string())
    } else {
        ScanVerdict::Error(format!("clamd: {body}"))
    }
}

/// Scanner that reports every file clean. Development only.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledScanner;

#[async_trait]
impl Scanner for DisabledScanner {
    async fn scan(&self, _path: &Path) -> ScanVerdict {
        ScanVerdict::Clean
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
