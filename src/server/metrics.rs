use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

const PREFIX: &str = "skill_catalog";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Catalog
    pub static ref CATALOG_EXPORTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_exports_total"), "Skill export attempts by outcome"),
        &["outcome"]
    ).expect("Failed to create exports_total metric");

    pub static ref CATALOG_IMPORTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_imports_total"), "Skill import attempts by outcome"),
        &["outcome"]
    ).expect("Failed to create imports_total metric");

    pub static ref CATALOG_FINALIZATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_finalizations_total"), "Binding finalizations by outcome"),
        &["outcome"]
    ).expect("Failed to create finalizations_total metric");

    pub static ref CATALOG_DELETIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_deletions_total"), "Catalog entry deletions by outcome"),
        &["outcome"]
    ).expect("Failed to create deletions_total metric");

    pub static ref CATALOG_ENTRIES: IntGauge = IntGauge::new(
        format!("{PREFIX}_entries"),
        "Number of skills currently in the catalog"
    ).expect("Failed to create entries metric");

    pub static ref FINALIZATION_QUEUE_DEPTH: IntGauge = IntGauge::new(
        format!("{PREFIX}_finalization_queue_depth"),
        "Bindings waiting for finalization"
    ).expect("Failed to create finalization_queue_depth metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Registers every metric. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_EXPORTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_IMPORTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_FINALIZATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_DELETIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_ENTRIES.clone()));
    let _ = REGISTRY.register(Box::new(FINALIZATION_QUEUE_DEPTH.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_export(outcome: &str) {
    CATALOG_EXPORTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_import(outcome: &str) {
    CATALOG_IMPORTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_finalization(outcome: &str) {
    CATALOG_FINALIZATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_deletion(outcome: &str) {
    CATALOG_DELETIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_catalog_entries(count: i64) {
    CATALOG_ENTRIES.set(count);
}

pub fn set_finalization_queue_depth(depth: usize) {
    FINALIZATION_QUEUE_DEPTH.set(depth as i64);
}

pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<f64>().ok());
            if let Some(kb) = rss_kb {
                PROCESS_MEMORY_BYTES.set(kb * 1024.0);
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
