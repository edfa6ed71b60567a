//! Route configuration.

use crate::client_ip::client_middleware;
use crate::cors::{cors_layer, origin_audit_middleware};
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Result<Router, String> {
    let upload_limit = usize::try_from(state.config.server.max_upload_bytes).unwrap_or(usize::MAX);

    let client_routes = Router::new()
        .route(
            "/sendFile",
            post(handlers::send_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/downloadFile", get(handlers::download_file))
        .route("/deleteFile", post(handlers::delete_file))
        .route("/deleteUser", post(handlers::delete_user))
        .route("/myInfo", get(handlers::my_info))
        .route("/fileInfo", get(handlers::file_info))
        // Attributes each request to a client identity.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            client_middleware,
        ));

    let mut router = Router::new()
        .merge(client_routes)
        // Intentionally outside the client layer for load balancer probes.
        .route("/health", get(handlers::health_check));

    // When enabled, /metrics should be network-restricted to the scraper.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    if let Some(cors) = cors_layer(&state.config.server)? {
        router = router.layer(cors);
    }

    // Order of execution: TraceLayer -> origin audit -> CORS -> client -> handler
    Ok(router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            origin_audit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
