use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics: Prometheus text exposition of the job counters and timings.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the orchestrator emits.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "generation_jobs_submitted_total",
        "Generation jobs accepted, by input kind"
    );
    metrics::describe_counter!(
        "generation_jobs_completed_total",
        "Generation jobs that reached completed"
    );
    metrics::describe_counter!(
        "generation_jobs_failed_total",
        "Generation jobs that reached failed, by error code"
    );
    metrics::describe_counter!(
        "provider_retries_total",
        "Provider calls retried after a transient error"
    );
    metrics::describe_counter!("jobs_evicted_total", "Terminal jobs evicted after retention");
    metrics::describe_gauge!(
        "generation_jobs_in_flight",
        "Jobs whose lifecycle task is currently running"
    );
    metrics::describe_histogram!(
        "generation_job_duration_seconds",
        "Time from submission to the end of a job's lifecycle task"
    );
}
