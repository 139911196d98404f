use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!("jobs_submitted_total", "Jobs created by intake");
    metrics::describe_counter!(
        "jobs_deduplicated_total",
        "Submissions answered with an existing job"
    );
    metrics::describe_counter!("jobs_completed_total", "Jobs that reached done");
    metrics::describe_counter!("jobs_failed_total", "Jobs marked failed, by reason");
    metrics::describe_counter!("jobs_retried_total", "Manual retries of failed jobs");
    metrics::describe_counter!(
        "callbacks_rejected_total",
        "Callbacks refused at signature verification"
    );
    metrics::describe_gauge!("dispatch_queue_depth", "Job ids waiting for the dispatch worker");
    metrics::describe_histogram!(
        "compute_submit_seconds",
        "Latency of compute backend submissions"
    );
}

/// Prometheus scrape endpoint in text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
