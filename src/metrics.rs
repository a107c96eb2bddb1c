//! Prometheus metrics

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

/// Setup Prometheus metrics exporter
/// Returns a handle that can be used to retrieve metrics
pub fn setup_metrics() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!("Prometheus metrics exporter installed");

    Ok(handle)
}

/// Record an activation request and how it ended
/// (`already_active`, `reused`, `created`, `failed`)
pub fn record_activation(model: &str, outcome: &'static str) {
    metrics::counter!("owngpt_activations_total",
        "model" => model.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a chat request (`blocking` or `stream`)
pub fn record_chat_request(mode: &'static str, success: bool) {
    metrics::counter!("owngpt_chat_requests_total",
        "mode" => mode,
        "success" => if success { "true" } else { "false" }
    )
    .increment(1);
}

/// Record a model deletion
pub fn record_model_deleted(model: &str) {
    metrics::counter!("owngpt_models_deleted_total",
        "model" => model.to_string()
    )
    .increment(1);
}

pub fn record_resync() {
    metrics::counter!("owngpt_resyncs_total").increment(1);
}

/// Record how long a readiness wait took
pub fn record_readiness_wait(elapsed: Duration, ready: bool) {
    metrics::histogram!("owngpt_readiness_wait_seconds",
        "ready" => if ready { "true" } else { "false" }
    )
    .record(elapsed.as_secs_f64());
}

/// 1 while a model is designated current, 0 otherwise
pub fn set_model_active(active: bool) {
    metrics::gauge!("owngpt_model_active").set(if active { 1.0 } else { 0.0 });
}
