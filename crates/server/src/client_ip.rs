//! Client address resolution.
//!
//! Every request is attributed to a [`ClientIdentity`] derived from the
//! client's network address. The address comes from the TCP peer unless the
//! peer is a trusted proxy, in which case forwarding headers are honoured:
//!
//! - Empty `trusted_proxies` (default): only the connection address is used
//! - List of IPs/CIDRs: headers are read when the peer matches an entry
//! - `["*"]`: headers are read from any peer (development only)

use crate::state::AppState;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, Request},
    middleware::Next,
    response::Response,
};
use ipnet::IpNet;
use moada_core::ClientIdentity;
use moada_core::config::ServerConfig;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A parsed trusted proxy entry (either an IP or CIDR range).
#[derive(Clone, Debug)]
enum TrustedEntry {
    Ip(IpAddr),
    Cidr(IpNet),
}

/// Which peers may set forwarding headers.
#[derive(Clone, Debug)]
enum TrustedProxies {
    None,
    All,
    List(Vec<TrustedEntry>),
}

impl TrustedProxies {
    fn from_config(proxies: &[String]) -> Self {
        if proxies.is_empty() {
            return Self::None;
        }
        if proxies.len() == 1 && proxies[0] == "*" {
            return Self::All;
        }

        let entries = proxies
            .iter()
            .filter_map(|p| {
                let parsed = if p.contains('/') {
                    p.parse::<IpNet>()
                        .map(TrustedEntry::Cidr)
                        .map_err(|e| e.to_string())
                } else {
                    p.parse::<IpAddr>()
                        .map(TrustedEntry::Ip)
                        .map_err(|e| e.to_string())
                };
                parsed
                    .inspect_err(|e| {
                        tracing::warn!("Invalid entry in trusted_proxies: '{}': {}", p, e)
                    })
                    .ok()
            })
            .collect();
        Self::List(entries)
    }

    fn is_trusted(&self, peer: IpAddr) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::List(entries) => entries.iter().any(|entry| match entry {
                TrustedEntry::Ip(trusted) => *trusted == peer,
                TrustedEntry::Cidr(network) => network.contains(&peer),
            }),
        }
    }
}

/// The client a request is attributed to, inserted as a request extension.
#[derive(Clone, Debug)]
pub struct Client {
    pub identity: ClientIdentity,
}

/// Resolves the client address of incoming requests.
#[derive(Clone, Debug)]
pub struct ClientResolver {
    header: HeaderName,
    trusted: TrustedProxies,
    connect_info_warned: Arc<AtomicBool>,
}

impl ClientResolver {
    pub fn new(config: &ServerConfig) -> Result<Self, String> {
        let header = HeaderName::from_bytes(config.client_ip_header.as_bytes()).map_err(|e| {
            format!(
                "invalid server.client_ip_header '{}': {e}",
                config.client_ip_header
            )
        })?;
        Ok(Self {
            header,
            trusted: TrustedProxies::from_config(&config.trusted_proxies),
            connect_info_warned: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Client address of `req`, or `"unknown"` when none can be determined.
    pub fn resolve(&self, req: &Request<Body>) -> String {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip());

        let trust_headers = match (peer, &self.trusted) {
            (None, TrustedProxies::All) => true,
            // A listed proxy cannot be verified without the peer address.
            (None, _) => false,
            (Some(peer), trusted) => trusted.is_trusted(peer),
        };

        if trust_headers && let Some(forwarded) = self.forwarded_address(req) {
            return forwarded;
        }

        match peer {
            Some(ip) => ip.to_string(),
            None => {
                if !self.connect_info_warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        "ConnectInfo missing from requests; all clients share the 'unknown' identity"
                    );
                }
                "unknown".to_string()
            }
        }
    }

    fn forwarded_address(&self, req: &Request<Body>) -> Option<String> {
        let header_value = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        if let Some(ip) = header_value(self.header.as_str()) {
            return Some(ip.to_string());
        }
        if let Some(chain) = header_value("x-forwarded-for") {
            // The first entry is the original client.
            return chain.split(',').next().map(|ip| ip.trim().to_string());
        }
        header_value("x-real-ip").map(str::to_string)
    }
}

/// Attach the resolved [`Client`] to every request.
pub async fn client_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let address = state.client_resolver.resolve(&req);
    let identity = ClientIdentity::from_address(&address);
    req.extensions_mut().insert(Client { identity });
    next.run(req).await
}
