//! Pipeline metrics.
//!
//! Counters for processing outcomes, recorded through the `metrics` facade
//! and exposed in Prometheus text format at /metrics.

use std::sync::OnceLock;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Orders processed and committed.
pub const ORDERS_PROCESSED: &str = "orderflow_orders_processed_total";

/// Processor retry attempts after transient failures.
pub const PROCESSING_RETRIES: &str = "orderflow_processing_retries_total";

/// Records routed to the dead-letter topic.
pub const RECORDS_DEAD_LETTERED: &str = "orderflow_records_dead_lettered_total";

/// Dead-letter reconciliation attempts that failed.
pub const RECONCILE_FAILURES: &str = "orderflow_reconcile_failures_total";

/// Completion events that could not be published after the commit.
pub const COMPLETION_PUBLISH_FAILURES: &str = "orderflow_completion_publish_failures_total";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initializes the global metrics recorder with the Prometheus exporter.
///
/// Safe to call multiple times; subsequent calls are no-ops. The returned
/// handle is also stored globally for the /metrics endpoint.
///
/// # Panics
///
/// Panics if the Prometheus recorder cannot be installed; the service should
/// not start without metrics.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .unwrap_or_else(|e| panic!("failed to install prometheus recorder: {e}"));

            describe_counter!(ORDERS_PROCESSED, "Total orders processed and committed");
            describe_counter!(
                PROCESSING_RETRIES,
                "Total processor retry attempts after transient failures"
            );
            describe_counter!(
                RECORDS_DEAD_LETTERED,
                "Total records routed to the dead-letter topic"
            );
            describe_counter!(
                RECONCILE_FAILURES,
                "Total dead-letter reconciliation attempts that failed"
            );
            describe_counter!(
                COMPLETION_PUBLISH_FAILURES,
                "Total completion events that could not be published"
            );

            tracing::info!("Prometheus metrics recorder initialized");
            handle
        })
        .clone()
}

/// Returns the global Prometheus handle, if initialized.
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

/// Handler for the /metrics endpoint: Prometheus-formatted metrics text.
pub async fn serve_metrics() -> impl IntoResponse {
    match prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        ),
    }
}

pub fn record_order_processed() {
    counter!(ORDERS_PROCESSED).increment(1);
}

pub fn record_processing_retry() {
    counter!(PROCESSING_RETRIES).increment(1);
}

pub fn record_record_dead_lettered() {
    counter!(RECORDS_DEAD_LETTERED).increment(1);
}

pub fn record_reconcile_failure() {
    counter!(RECONCILE_FAILURES).increment(1);
}

pub fn record_completion_publish_failure() {
    counter!(COMPLETION_PUBLISH_FAILURES).increment(1);
}
