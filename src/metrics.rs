// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the lbsync controller.
//!
//! All metrics carry the `lbsync_` prefix.
//!
//! # Metrics Categories
//!
//! - **Operation Metrics** - Backend operations (provision, deprovision, node sync) and their outcomes
//! - **Backend Resource Metrics** - Monitors, pools, members and virtual servers created or deleted
//! - **Virtual IP Metrics** - Allocations, releases and allocation table conflicts
//! - **Dispatcher Metrics** - Per-key worker tasks
//!
//! # Example
//!
//! ```rust,no_run
//! use lbsync::metrics::record_operation_success;
//!
//! record_operation_success("provision", std::time::Duration::from_millis(250));
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "lbsync";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus registry for all controller metrics
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Operation Metrics
// ============================================================================

/// Total number of backend operations by operation and status
///
/// Labels:
/// - `operation`: provision, deprovision, node_added, node_removed, node_updated
/// - `status`: success, error
pub static OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_operations_total"),
        "Total number of backend operations by operation and status",
    );
    let counter = CounterVec::new(opts, &["operation", "status"])
        .expect("operations_total metric options are valid");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("operations_total is registered once");
    counter
});

/// Duration of backend operations in seconds
pub static OPERATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_operation_duration_seconds"),
        "Duration of backend operations in seconds by operation",
    )
    .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["operation"])
        .expect("operation_duration_seconds metric options are valid");
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("operation_duration_seconds is registered once");
    histogram
});

/// Total number of errors by operation and error class
///
/// Labels:
/// - `operation`: the failing operation
/// - `error_class`: fatal, validation, exhausted, transient
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by operation and error class",
    );
    let counter = CounterVec::new(opts, &["operation", "error_class"])
        .expect("errors_total metric options are valid");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("errors_total is registered once");
    counter
});

// ============================================================================
// Backend Resource Metrics
// ============================================================================

/// Total number of backend resources changed by kind and action
pub static BACKEND_RESOURCES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_backend_resources_total"),
        "Total number of backend resources changed by kind and action",
    );
    let counter = CounterVec::new(opts, &["kind", "action"])
        .expect("backend_resources_total metric options are valid");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("backend_resources_total is registered once");
    counter
});

// ============================================================================
// Virtual IP Metrics
// ============================================================================

/// Total number of virtual IP allocator outcomes
///
/// Labels:
/// - `result`: allocated, reused, released, exhausted
pub static VIP_ALLOCATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_vip_allocations_total"),
        "Total number of virtual IP allocator outcomes by result",
    );
    let counter = CounterVec::new(opts, &["result"])
        .expect("vip_allocations_total metric options are valid");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("vip_allocations_total is registered once");
    counter
});

/// Total number of compare-and-swap conflicts on the allocation table
pub static ALLOCATION_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        format!("{METRICS_NAMESPACE}_allocation_conflicts_total"),
        "Total number of compare-and-swap conflicts on the allocation table",
    )
    .expect("allocation_conflicts_total metric options are valid");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("allocation_conflicts_total is registered once");
    counter
});

/// Number of virtual IPs held by the local keepalived daemon
pub static VIPS_HELD: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_vips_held"),
        "Number of virtual IPs held by the local keepalived daemon",
    )
    .expect("vips_held metric options are valid");
    METRICS_REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("vips_held is registered once");
    gauge
});

// ============================================================================
// Dispatcher Metrics
// ============================================================================

/// Number of live per-key worker tasks
pub static ACTIVE_WORKERS: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        format!("{METRICS_NAMESPACE}_active_workers"),
        "Number of live per-key worker tasks",
    )
    .expect("active_workers metric options are valid");
    METRICS_REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("active_workers is registered once");
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful backend operation
pub fn record_operation_success(operation: &str, duration: Duration) {
    OPERATIONS_TOTAL
        .with_label_values(&[operation, "success"])
        .inc();
    OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
}

/// Record a failed backend operation and its error class
pub fn record_operation_error(operation: &str, duration: Duration, error_class: &str) {
    OPERATIONS_TOTAL
        .with_label_values(&[operation, "error"])
        .inc();
    OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
    ERRORS_TOTAL
        .with_label_values(&[operation, error_class])
        .inc();
}

/// Record a backend resource creation
pub fn record_resource_created(kind: &str) {
    BACKEND_RESOURCES_TOTAL
        .with_label_values(&[kind, "created"])
        .inc();
}

/// Record a backend resource modification
pub fn record_resource_updated(kind: &str) {
    BACKEND_RESOURCES_TOTAL
        .with_label_values(&[kind, "updated"])
        .inc();
}

/// Record a backend resource deletion
pub fn record_resource_deleted(kind: &str) {
    BACKEND_RESOURCES_TOTAL
        .with_label_values(&[kind, "deleted"])
        .inc();
}

/// Record a virtual IP allocator outcome
pub fn record_vip_allocation(result: &str) {
    VIP_ALLOCATIONS_TOTAL.with_label_values(&[result]).inc();
}

/// Record a compare-and-swap conflict on the allocation table
pub fn record_allocation_conflict() {
    ALLOCATION_CONFLICTS_TOTAL.inc();
}

/// Set the number of VIPs held by keepalived
#[allow(clippy::cast_precision_loss)]
pub fn set_vips_held(count: usize) {
    VIPS_HELD.set(count as f64);
}

/// Record a worker task starting
pub fn record_worker_started() {
    ACTIVE_WORKERS.inc();
}

/// Record a worker task exiting
pub fn record_worker_stopped() {
    ACTIVE_WORKERS.dec();
}

/// Gather all metrics in Prometheus text format
///
/// # Errors
///
/// Returns an error if metrics cannot be encoded.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

/// Handler for `GET /metrics`
async fn metrics_handler() -> Response {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Router exposing the registry at `/metrics`
pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve [`metrics_router`] on `addr` until the task is dropped
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve_metrics(addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, metrics_router()).await
}
