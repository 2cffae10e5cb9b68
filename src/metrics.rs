//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("murmur_http_requests_total", "Total number of HTTP requests"),
        &["method", "status"]
    ).expect("metric can be created");

    // Write path Metrics
    pub static ref EDGE_TOGGLES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("murmur_edge_toggles_total", "Total number of committed edge toggles"),
        &["edge", "state"]
    ).expect("metric can be created");
    pub static ref TX_RETRIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("murmur_tx_retries_total", "Transactions re-executed after a transient conflict"),
        &["label"]
    ).expect("metric can be created");
    pub static ref TX_EXHAUSTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("murmur_tx_exhausted_total", "Transactions that ran out of retry attempts"),
        &["label"]
    ).expect("metric can be created");
    pub static ref TX_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "murmur_tx_duration_seconds",
            "Transaction duration including retries in seconds"
        ).buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["label"]
    ).expect("metric can be created");

    // Fan-out Metrics
    pub static ref FANOUT_ROWS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("murmur_fanout_rows_total", "Rows materialized by fan-out jobs"),
        &["job"]
    ).expect("metric can be created");
    pub static ref FANOUT_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("murmur_fanout_failures_total", "Fan-out jobs that failed"),
        &["job"]
    ).expect("metric can be created");
    pub static ref FANOUT_DROPPED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("murmur_fanout_dropped_total", "Fan-out jobs dropped before execution"),
        &["job", "reason"]
    ).expect("metric can be created");
    pub static ref FANOUT_QUEUE_DEPTH: IntGauge = IntGauge::new(
        "murmur_fanout_queue_depth",
        "Fan-out jobs waiting for a worker"
    ).expect("metric can be created");
    pub static ref BROADCAST_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("murmur_broadcast_failures_total", "Rows the broadcast sink refused"),
        &["kind"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("murmur_errors_total", "Total number of errors returned to clients"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("HTTP_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(EDGE_TOGGLES_TOTAL.clone()))
        .expect("EDGE_TOGGLES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(TX_RETRIES_TOTAL.clone()))
        .expect("TX_RETRIES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(TX_EXHAUSTED_TOTAL.clone()))
        .expect("TX_EXHAUSTED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(TX_DURATION_SECONDS.clone()))
        .expect("TX_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(FANOUT_ROWS_TOTAL.clone()))
        .expect("FANOUT_ROWS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FANOUT_FAILURES_TOTAL.clone()))
        .expect("FANOUT_FAILURES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FANOUT_DROPPED_TOTAL.clone()))
        .expect("FANOUT_DROPPED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FANOUT_QUEUE_DEPTH.clone()))
        .expect("FANOUT_QUEUE_DEPTH can be registered");
    REGISTRY
        .register(Box::new(BROADCAST_FAILURES_TOTAL.clone()))
        .expect("BROADCAST_FAILURES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

/// Record a finished transaction.
pub fn observe_transaction(label: &str, elapsed: std::time::Duration) {
    TX_DURATION_SECONDS
        .with_label_values(&[label])
        .observe(elapsed.as_secs_f64());
}
