// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const ARTIFACTS_SAVED: &str = "ocstore_artifacts_saved_total";
pub const ARTIFACTS_HARVESTED: &str = "ocstore_artifacts_harvested_total";
pub const ROOT_PUBLISHED: &str = "ocstore_root_published_total";
pub const CYCLES_FAILED: &str = "ocstore_cycles_failed_total";
pub const HARVEST_DURATION: &str = "ocstore_harvest_duration_seconds";

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ocstore_node=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if PROM_HANDLE.set(handle).is_err() {
        tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
    }

    metrics::describe_counter!(ARTIFACTS_SAVED, "Artifacts written to the local tree");
    metrics::describe_counter!(ARTIFACTS_HARVESTED, "Artifacts newly stored by harvesting");
    metrics::describe_counter!(ROOT_PUBLISHED, "Root addresses published to the name service");
    metrics::describe_counter!(CYCLES_FAILED, "Publish or discover cycles that failed");
    metrics::describe_histogram!(HARVEST_DURATION, "Time taken to harvest one tree");

    metrics::gauge!("ocstore_node_up", 1.0);
}

/// Get the Prometheus handle to render metrics
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
