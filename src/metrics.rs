//! Prometheus metrics for the extension operations
//!
//! Metrics live in a private [`prometheus::Registry`] so several services can
//! coexist in one process (tests build many).

use crate::error::{Error, Result};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Outcome label of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }

    pub fn of<T>(result: &Result<T>) -> Self {
        if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

/// Counters and latency histograms for every operation
#[derive(Clone)]
pub struct OperationMetrics {
    registry: Registry,
    operations: IntCounterVec,
    durations: HistogramVec,
    probes: IntCounterVec,
}

impl std::fmt::Debug for OperationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationMetrics").finish_non_exhaustive()
    }
}

fn registration_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("Failed to register metric: {}", e))
}

impl OperationMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new(
                "replication_operations_total",
                "Extension operations by outcome",
            ),
            &["operation", "outcome"],
        )
        .map_err(registration_error)?;

        let durations = HistogramVec::new(
            HistogramOpts::new(
                "replication_operation_duration_seconds",
                "Duration of extension operations",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["operation"],
        )
        .map_err(registration_error)?;

        let probes = IntCounterVec::new(
            Opts::new("array_probes_total", "Array connectivity probes by outcome"),
            &["outcome"],
        )
        .map_err(registration_error)?;

        registry
            .register(Box::new(operations.clone()))
            .map_err(registration_error)?;
        registry
            .register(Box::new(durations.clone()))
            .map_err(registration_error)?;
        registry
            .register(Box::new(probes.clone()))
            .map_err(registration_error)?;

        Ok(Self {
            registry,
            operations,
            durations,
            probes,
        })
    }

    /// Record one finished operation
    pub fn observe(&self, operation: &str, outcome: Outcome, elapsed: Duration) {
        self.operations
            .with_label_values(&[operation, outcome.as_str()])
            .inc();
        self.durations
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_probe(&self, outcome: Outcome) {
        self.probes.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn operation_count(&self, operation: &str, outcome: Outcome) -> u64 {
        self.operations
            .with_label_values(&[operation, outcome.as_str()])
            .get()
    }

    pub fn probe_count(&self, outcome: Outcome) -> u64 {
        self.probes.with_label_values(&[outcome.as_str()]).get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render in the Prometheus text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("Metrics are not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_operations() {
        let metrics = OperationMetrics::new().unwrap();
        metrics.observe("create_protection_group", Outcome::Success, Duration::from_millis(20));
        metrics.observe("create_protection_group", Outcome::Failure, Duration::from_millis(5));
        metrics.observe("create_protection_group", Outcome::Success, Duration::from_millis(7));

        assert_eq!(metrics.operation_count("create_protection_group", Outcome::Success), 2);
        assert_eq!(metrics.operation_count("create_protection_group", Outcome::Failure), 1);

        let text = metrics.render().unwrap();
        assert!(text.contains("replication_operations_total"));
        assert!(text.contains("replication_operation_duration_seconds_bucket"));
    }

    #[test]
    fn test_probe_counter() {
        let metrics = OperationMetrics::new().unwrap();
        metrics.record_probe(Outcome::Failure);
        assert_eq!(metrics.probe_count(Outcome::Failure), 1);
        assert_eq!(metrics.probe_count(Outcome::Success), 0);
    }

    #[test]
    fn test_outcome_of_result() {
        let ok: Result<()> = Ok(());
        let err: Result<()> = Err(Error::Internal("boom".into()));
        assert_eq!(Outcome::of(&ok), Outcome::Success);
        assert_eq!(Outcome::of(&err), Outcome::Failure);
    }
}
