//! Run metrics recorded through the `metrics` facade.
//!
//! A Prometheus recorder is installed without an HTTP listener; the batch
//! job renders it once at the end and, when `CHOCO_PUSHGATEWAY_URL` is set,
//! pushes the snapshot to a Pushgateway.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const RUNS_TOTAL: &str = "choco_pipeline_runs_total";
pub const FETCH_DURATION_SECONDS: &str = "choco_fetch_duration_seconds";
pub const RAW_RECORDS_PER_RUN: &str = "choco_raw_records_per_run";
pub const ROWS_DROPPED_TOTAL: &str = "choco_rows_dropped_total";
pub const QUERIES_SUCCEEDED_TOTAL: &str = "choco_queries_succeeded_total";
pub const QUERIES_FAILED_TOTAL: &str = "choco_queries_failed_total";
pub const ARTIFACT_BYTES: &str = "choco_artifact_bytes";
pub const WRITE_ERRORS_TOTAL: &str = "choco_write_errors_total";
pub const RUN_DURATION_SECONDS: &str = "choco_pipeline_duration_seconds";

/// Installs the global recorder. Safe to call more than once.
pub fn init_metrics() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Text exposition of everything recorded so far
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// Pushes the rendered metrics to the configured Pushgateway, if any.
pub async fn push_to_gateway(job: &str) {
    let base = match std::env::var("CHOCO_PUSHGATEWAY_URL") {
        Ok(v) if !v.trim().is_empty() => v,
        _ => return,
    };
    let Some(body) = render() else {
        warn!("Metrics recorder not installed, nothing to push");
        return;
    };
    let push_url = format!("{}/metrics/job/{}", base.trim_end_matches('/'), job);

    let res = reqwest::Client::new()
        .post(&push_url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
        .await;
    match res {
        Ok(r) if r.status().is_success() => info!("Pushed metrics to {}", push_url),
        Ok(r) => warn!("Pushgateway responded with status {}", r.status().as_u16()),
        Err(e) => warn!("Failed to push metrics to Pushgateway: {}", e),
    }
}
