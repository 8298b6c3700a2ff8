//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `arch_scheduling_pods_enqueued_total` - Pods matched by the classifier and enqueued
//! - `arch_scheduling_log_read_errors_total` - Container log fetch/read failures
//! - `arch_scheduling_reconciliations_total` - Total number of reconciliations
//! - `arch_scheduling_reconciliation_errors_total` - Total number of reconciliation errors
//! - `arch_scheduling_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `arch_scheduling_patches_applied_total` - Affinity patches applied to controller objects
//! - `arch_scheduling_requeues_total` - Rate-limited requeues by failure reason
//! - `arch_scheduling_abandoned_total` - Keys dropped after exhausting their retries
//! - `arch_scheduling_watch_errors_total` - Pod watch stream errors by kind
//! - `arch_scheduling_work_queue_depth` - Keys ready to be processed

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static PODS_ENQUEUED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "arch_scheduling_pods_enqueued_total",
        "Total number of pods classified as architecture mismatches and enqueued",
    )
    .expect("Failed to create PODS_ENQUEUED_TOTAL metric - this should never happen")
});

static LOG_READ_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "arch_scheduling_log_read_errors_total",
        "Total number of container log fetch or read failures",
    )
    .expect("Failed to create LOG_READ_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "arch_scheduling_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "arch_scheduling_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "arch_scheduling_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static PATCHES_APPLIED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "arch_scheduling_patches_applied_total",
        "Total number of node affinity patches applied to controller objects",
    )
    .expect("Failed to create PATCHES_APPLIED_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "arch_scheduling_requeues_total",
            "Total number of rate-limited requeues by failure reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static ABANDONED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "arch_scheduling_abandoned_total",
        "Total number of keys dropped after exhausting their retries",
    )
    .expect("Failed to create ABANDONED_TOTAL metric - this should never happen")
});

static WATCH_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "arch_scheduling_watch_errors_total",
            "Total number of pod watch stream errors by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create WATCH_ERRORS_TOTAL metric - this should never happen")
});

static WORK_QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "arch_scheduling_work_queue_depth",
        "Number of keys ready to be processed",
    )
    .expect("Failed to create WORK_QUEUE_DEPTH metric - this should never happen")
});

/// Register all metrics with the registry
///
/// # Errors
///
/// Fails if called twice, since a metric cannot be registered more than once.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(PODS_ENQUEUED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LOG_READ_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(PATCHES_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ABANDONED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCH_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORK_QUEUE_DEPTH.clone()))?;

    Ok(())
}

pub fn increment_pods_enqueued() {
    PODS_ENQUEUED_TOTAL.inc();
}

pub fn increment_log_read_errors() {
    LOG_READ_ERRORS_TOTAL.inc();
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_patches_applied() {
    PATCHES_APPLIED_TOTAL.inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_abandoned() {
    ABANDONED_TOTAL.inc();
}

pub fn increment_watch_errors(kind: &str) {
    WATCH_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn set_work_queue_depth(depth: usize) {
    WORK_QUEUE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
}

/// Current metric families, for the `/metrics` endpoint
#[must_use]
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_counter_is_labelled_by_reason() {
        let before = REQUEUES_TOTAL.with_label_values(&["node-lookup"]).get();
        increment_requeues_total("node-lookup");
        increment_requeues_total("node-lookup");
        assert_eq!(
            REQUEUES_TOTAL.with_label_values(&["node-lookup"]).get(),
            before + 2
        );
    }

    #[test]
    fn test_queue_depth_gauge() {
        set_work_queue_depth(7);
        assert_eq!(WORK_QUEUE_DEPTH.get(), 7);
    }
}
