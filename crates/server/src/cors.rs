//! Cross-origin policy and origin auditing.

use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, header},
    middleware::Next,
    response::Response,
};
use moada_core::config::ServerConfig;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// CORS layer admitting only the configured origin.
///
/// Returns `None` when no origin is configured, in which case browsers get
/// no CORS headers at all.
pub fn cors_layer(config: &ServerConfig) -> Result<Option<CorsLayer>, String> {
    let Some(origin) = &config.allowed_origin else {
        return Ok(None);
    };
    let origin = HeaderValue::from_str(origin)
        .map_err(|e| format!("invalid server.allowed_origin '{origin}': {e}"))?;

    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::ORIGIN, header::CONTENT_TYPE])
            .expose_headers([header::CONTENT_LENGTH, header::CONTENT_DISPOSITION])
            .allow_credentials(true),
    ))
}

/// Log requests whose `Origin` is not the configured one.
///
/// Requests are never refused here; the CORS layer handles browsers.
pub async fn origin_audit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(allowed) = &state.config.server.allowed_origin {
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if origin != allowed {
            tracing::warn!(
                origin = %origin,
                method = %req.method(),
                path = %req.uri().path(),
                "Request from unauthorized origin"
            );
        }
    }
    next.run(req).await
}
