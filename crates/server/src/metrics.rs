//! Prometheus counters for the data plane.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec};

pub(crate) static PUT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "link_put_requests_total",
        "Total PUT admissions by outcome",
        &["outcome"]
    )
    .expect("register_int_counter_vec")
});

pub(crate) static GET_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "link_get_requests_total",
        "Total GET lookups by result",
        &["result"]
    )
    .expect("register_int_counter_vec")
});

pub(crate) static ANNOUNCE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "link_announcements_total",
        "Total ANNOUNCE frames queued for delivery, by source",
        &["source"]
    )
    .expect("register_int_counter_vec")
});

/// Serves the default registry in the Prometheus text exposition format.
pub(crate) async fn metrics_handler() -> ([(axum::http::HeaderName, String); 1], axum::body::Bytes) {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::with_capacity(1 << 16);
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(error = %e, "Failed to encode prometheus metrics");
    }
    (
        [(
            axum::http::header::CONTENT_TYPE,
            encoder.format_type().to_string(),
        )],
        buf.into(),
    )
}
