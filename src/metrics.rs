/// Metrics and telemetry for the matching service
///
/// Prometheus-compatible metrics for monitoring:
/// - HTTP request counts
/// - References and offers created
/// - Resolution outcomes, including lost accept races
/// - Accept transaction latency

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Total HTTP requests by method and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "status"]
    )
    .unwrap();

    pub static ref REFERENCES_CREATED_TOTAL: IntCounter = register_int_counter!(
        "references_created_total",
        "Total number of references created"
    )
    .unwrap();

    pub static ref OFFERS_CREATED_TOTAL: IntCounter = register_int_counter!(
        "offers_created_total",
        "Total number of offers created"
    )
    .unwrap();

    /// Resolutions by decision (accept/decline) and outcome
    pub static ref OFFER_RESOLUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "offer_resolutions_total",
        "Offer resolutions by decision and outcome",
        &["decision", "outcome"]
    )
    .unwrap();

    /// Duration of committed accept transactions
    pub static ref MATCH_TRANSACTION_DURATION_SECONDS: Histogram = register_histogram!(
        "match_transaction_duration_seconds",
        "Latency of committed accept transactions in seconds",
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]
    )
    .unwrap();
}

/// Render all metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

/// Record the outcome of a resolveOffer call
pub fn record_resolution(decision: &str, outcome: &str) {
    OFFER_RESOLUTIONS_TOTAL
        .with_label_values(&[decision, outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_resolution() {
        record_resolution("accept", "conflict");
        let metrics = render_metrics();
        assert!(metrics.contains("offer_resolutions_total"));
    }

    #[test]
    fn test_record_http_request() {
        record_http_request("POST", 409);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
    }
}
