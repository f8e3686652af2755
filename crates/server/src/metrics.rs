//! Prometheus metrics for the relay.
//!
//! The `/metrics` endpoint is unauthenticated for scraping. It exposes only
//! aggregate counts (no upload IDs or file names); restrict it at the network
//! level when the relay is public.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static UPLOADS_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "uprelay_uploads_started_total",
        "Total number of uploads accepted for relay",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "uprelay_uploads_completed_total",
        "Total number of uploads stored upstream",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "uprelay_uploads_failed_total",
            "Total number of failed uploads by stage",
        ),
        &["stage"],
    )
    .expect("metric creation failed")
});

pub static BYTES_RELAYED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "uprelay_bytes_relayed_total",
        "Total bytes of completed uploads",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "uprelay_upload_duration_seconds",
            "Time from relay start to provider acknowledgement",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )
    .expect("metric creation failed")
});

pub static ACTIVE_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "uprelay_sessions_active",
        "Number of sessions held in memory",
    )
    .expect("metric creation failed")
});

pub static SESSIONS_EVICTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "uprelay_sessions_evicted_total",
        "Total number of sessions removed by the sweep",
    )
    .expect("metric creation failed")
});

pub static PROGRESS_STREAMS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "uprelay_progress_streams_active",
        "Number of open progress event streams",
    )
    .expect("metric creation failed")
});

pub static DIRECT_TICKETS_ISSUED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "uprelay_direct_tickets_issued_total",
        "Total number of direct-upload tickets issued",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests and embedded routers can call it freely.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOADS_STARTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_FAILED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_RELAYED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ACTIVE_SESSIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SESSIONS_EVICTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROGRESS_STREAMS_ACTIVE.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DIRECT_TICKETS_ISSUED.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
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

/// Record a failed upload by the stage that failed.
pub fn record_upload_failure(stage: &str) {
    UPLOADS_FAILED.with_label_values(&[stage]).inc();
}
