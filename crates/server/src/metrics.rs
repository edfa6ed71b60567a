//! Prometheus metrics for the MOADA server.
//!
//! Metrics carry no identities, identifiers or file names, only aggregate
//! counts. The `/metrics` endpoint is unauthenticated and should still be
//! network-restricted to the scraper.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Upload metrics
pub static UPLOADS_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("moada_uploads_stored_total", "Total number of files stored")
        .expect("metric creation failed")
});

pub static UPLOADS_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "moada_uploads_deduplicated_total",
        "Total number of uploads answered with an already stored file",
    )
    .expect("metric creation failed")
});

pub static BYTES_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("moada_bytes_stored_total", "Total bytes written to storage")
        .expect("metric creation failed")
});

pub static SCAN_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "moada_scan_duration_seconds",
            "Time taken by the antivirus scan of one upload",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("metric creation failed")
});

pub static HOST_USAGE_BYTES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "moada_host_usage_bytes",
        "Bytes stored on the host at the last upload",
    )
    .expect("metric creation failed")
});

// Removal metrics
pub static FILES_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("moada_files_deleted_total", "Total number of files deleted")
        .expect("metric creation failed")
});

pub static CLIENTS_ERASED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "moada_clients_erased_total",
        "Total number of clients that erased all their data",
    )
    .expect("metric creation failed")
});

// Error metrics
pub static CORRUPTION_DETECTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "moada_corruption_detected_total",
        "Total number of catalog/disk inconsistencies detected",
    )
    .expect("metric creation failed")
});

pub static REQUEST_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("moada_request_errors_total", "Total rejected requests by kind"),
        &["kind"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOADS_STORED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_DEDUPLICATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_STORED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SCAN_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(HOST_USAGE_BYTES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FILES_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CLIENTS_ERASED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CORRUPTION_DETECTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REQUEST_ERRORS.clone()))
            .expect("metric registration failed");
    });
}

/// Handler for the `/metrics` endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count a rejected request.
pub fn record_error(kind: &str) {
    REQUEST_ERRORS.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        register_metrics();
        register_metrics();
        UPLOADS_STORED.inc();
        record_error("not_found");

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("moada_uploads_stored_total"));
        assert!(text.contains("moada_request_errors_total{kind=\"not_found\"}"));
    }
}
