use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

use crate::AppState;

pub const AUTO_CLOSE_REMINDERS_SENT: &str = "auto_close_reminders_sent_total";
pub const AUTO_CLOSE_ENTRIES_CLOSED: &str = "auto_close_entries_closed_total";
pub const AUTO_CLOSE_SCAN_FAILURES: &str = "auto_close_scan_failures_total";
pub const SMS_SEND_FAILURES: &str = "sms_send_failures_total";

pub struct MetricsState {
    pub handle: PrometheusHandle,
}

/// Installs the global Prometheus recorder. Fails if one is already installed.
pub fn setup_metrics_recorder() -> Result<MetricsState, String> {
    let handle = PrometheusBuilder::new()
        // Latency buckets in seconds
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .map_err(|e| format!("failed to set histogram buckets: {}", e))?
        .install_recorder()
        .map_err(|e| format!("failed to install Prometheus recorder: {}", e))?;

    metrics::describe_counter!(AUTO_CLOSE_REMINDERS_SENT, "Clock-out reminders sent by the auto-close worker");
    metrics::describe_counter!(AUTO_CLOSE_ENTRIES_CLOSED, "Open time entries closed by the auto-close worker");
    metrics::describe_counter!(AUTO_CLOSE_SCAN_FAILURES, "Auto-close scans that failed");
    metrics::describe_counter!(SMS_SEND_FAILURES, "SMS messages the gateway rejected");

    Ok(MetricsState { handle })
}

/// GET /metrics (debug key required)
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics.handle.render())
}
