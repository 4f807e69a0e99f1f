//! # Metrics
//!
//! Prometheus metrics for monitoring rotations.
//!
//! ## Metrics Exposed
//!
//! - `secret_rotator_steps_total` - Step invocations by step
//! - `secret_rotator_step_errors_total` - Failed step invocations by step and error kind
//! - `secret_rotator_step_duration_seconds` - Duration of step handlers
//! - `secret_rotator_idempotent_skips_total` - Redelivered steps absorbed as no-ops
//! - `secret_rotator_store_operations_total` - Store calls by backend and operation
//! - `secret_rotator_store_operation_errors_total` - Failed store calls by backend
//! - `secret_rotator_store_operation_duration_seconds` - Duration of store calls by backend

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static STEPS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_rotator_steps_total",
            "Total number of rotation step invocations",
        ),
        &["step"],
    )
    .expect("Failed to create STEPS_TOTAL metric - this should never happen")
});

static STEP_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_rotator_step_errors_total",
            "Total number of failed rotation step invocations",
        ),
        &["step", "kind"],
    )
    .expect("Failed to create STEP_ERRORS_TOTAL metric - this should never happen")
});

static STEP_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "secret_rotator_step_duration_seconds",
            "Duration of rotation step handlers in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["step"],
    )
    .expect("Failed to create STEP_DURATION metric - this should never happen")
});

static IDEMPOTENT_SKIPS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_rotator_idempotent_skips_total",
            "Total number of redelivered steps that were already complete",
        ),
        &["step"],
    )
    .expect("Failed to create IDEMPOTENT_SKIPS_TOTAL metric - this should never happen")
});

static STORE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_rotator_store_operations_total",
            "Total number of secret store operations",
        ),
        &["backend", "operation"],
    )
    .expect("Failed to create STORE_OPERATIONS_TOTAL metric - this should never happen")
});

static STORE_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_rotator_store_operation_errors_total",
            "Total number of failed secret store operations",
        ),
        &["backend"],
    )
    .expect("Failed to create STORE_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static STORE_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "secret_rotator_store_operation_duration_seconds",
            "Duration of secret store operations in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["backend"],
    )
    .expect("Failed to create STORE_OPERATION_DURATION metric - this should never happen")
});

/// Register all metrics with the crate registry
///
/// Safe to call more than once.
///
/// # Errors
///
/// Returns an error if a collector fails to register for any reason other
/// than already being registered.
pub fn register_metrics() -> Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(STEPS_TOTAL.clone()),
        Box::new(STEP_ERRORS_TOTAL.clone()),
        Box::new(STEP_DURATION.clone()),
        Box::new(IDEMPOTENT_SKIPS_TOTAL.clone()),
        Box::new(STORE_OPERATIONS_TOTAL.clone()),
        Box::new(STORE_OPERATION_ERRORS_TOTAL.clone()),
        Box::new(STORE_OPERATION_DURATION.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Snapshot of every registered metric family
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}

pub fn increment_steps(step: &str) {
    STEPS_TOTAL.with_label_values(&[step]).inc();
}

pub fn increment_step_errors(step: &str, kind: &str) {
    STEP_ERRORS_TOTAL.with_label_values(&[step, kind]).inc();
}

pub fn observe_step_duration(step: &str, duration: f64) {
    STEP_DURATION.with_label_values(&[step]).observe(duration);
}

pub fn increment_idempotent_skips(step: &str) {
    IDEMPOTENT_SKIPS_TOTAL.with_label_values(&[step]).inc();
}

pub fn record_store_operation(backend: &str, operation: &str) {
    STORE_OPERATIONS_TOTAL
        .with_label_values(&[backend, operation])
        .inc();
}

pub fn increment_store_operation_errors(backend: &str) {
    STORE_OPERATION_ERRORS_TOTAL
        .with_label_values(&[backend])
        .inc();
}

pub fn observe_store_duration(backend: &str, duration: f64) {
    STORE_OPERATION_DURATION
        .with_label_values(&[backend])
        .observe(duration);
}
