//! Prometheus metrics for the tournament server.
//!
//! Metrics are exposed in Prometheus text format on a separate listener
//! (`METRICS_BIND`). When no exporter is installed the recording functions
//! are no-ops.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts and duration by route and status
//! - **Sweep Metrics**: Payments expired, registrations promoted, results
//!   auto-confirmed, failures per sweep kind
//! - **Event Metrics**: Published events by topic

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
///
/// `route` is the matched route template, not the raw path, so ids do not
/// explode label cardinality.
pub fn http_requests_total(method: &str, route: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, route: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Sweep Metrics
// ============================================================================

/// Record one payment deadline sweep.
pub fn payment_sweep(expired: usize, promoted: usize, failed: usize) {
    metrics::counter!("payment_sweeps_total").increment(1);
    metrics::counter!("payments_expired_total").increment(expired as u64);
    metrics::counter!("waitlist_promotions_total").increment(promoted as u64);
    metrics::counter!("sweep_failures_total", "sweep" => "payment_expiry")
        .increment(failed as u64);
}

/// Record one auto-confirm scan.
pub fn auto_confirm_scan(confirmed: usize, failed: usize) {
    metrics::counter!("auto_confirm_scans_total").increment(1);
    metrics::counter!("results_auto_confirmed_total").increment(confirmed as u64);
    metrics::counter!("sweep_failures_total", "sweep" => "auto_confirm")
        .increment(failed as u64);
}

/// Record a published domain event.
pub fn event_published(topic: &'static str) {
    metrics::counter!("events_published_total", "topic" => topic).increment(1);
}

/// Record a sweep that could not run at all.
pub fn sweep_aborted(kind: &'static str) {
    metrics::counter!("sweep_aborted_total", "sweep" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        http_requests_total("GET", "/health", 200);
        http_request_duration_ms("GET", "/health", 1.5);
        payment_sweep(2, 1, 0);
        auto_confirm_scan(3, 1);
        sweep_aborted("payment_expiry");
        event_published("match.scheduled");
    }
}
