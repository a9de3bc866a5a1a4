//! Readiness reporting for health checks

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::pool::PoolLifecycle;

/// Coarse readiness derived from pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolStatus {
    /// No environment has been built yet
    NotAvailable,
    /// Some, but not all, environments are built
    Creating,
    /// The pool reached its target size
    Ok,
}

impl PoolStatus {
    pub fn from_counts(initialized: usize, target: usize) -> Self {
        if initialized == 0 {
            PoolStatus::NotAvailable
        } else if initialized < target {
            PoolStatus::Creating
        } else {
            PoolStatus::Ok
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, PoolStatus::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::NotAvailable => "NOT_AVAILABLE",
            PoolStatus::Creating => "CREATING",
            PoolStatus::Ok => "OK",
        }
    }
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of pool counters
#[cfg_attr(test, mockall::automock)]
pub trait PoolGauge: Send + Sync {
    fn target(&self) -> usize;
    fn initialized_count(&self) -> usize;
    fn idle_count(&self) -> usize;
    fn outstanding(&self) -> usize;
    fn lifecycle(&self) -> PoolLifecycle;
}

/// Point-in-time view of the pool, as served by the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: PoolStatus,
    pub lifecycle: PoolLifecycle,
    pub target: usize,
    pub initialized: usize,
    pub idle: usize,
    pub outstanding: usize,
}

/// Derives readiness from a pool without owning any state of its own
#[derive(Clone)]
pub struct StatusReporter {
    gauge: Arc<dyn PoolGauge>,
}

impl StatusReporter {
    pub fn new(gauge: Arc<dyn PoolGauge>) -> Self {
        Self { gauge }
    }

    pub fn report(&self) -> PoolStatus {
        PoolStatus::from_counts(self.gauge.initialized_count(), self.gauge.target())
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let initialized = self.gauge.initialized_count();
        let target = self.gauge.target();
        StatusSnapshot {
            status: PoolStatus::from_counts(initialized, target),
            lifecycle: self.gauge.lifecycle(),
            target,
            initialized,
            idle: self.gauge.idle_count(),
            outstanding: self.gauge.outstanding(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauge(initialized: usize, target: usize) -> MockPoolGauge {
        let mut gauge = MockPoolGauge::new();
        gauge.expect_initialized_count().return_const(initialized);
        gauge.expect_target().return_const(target);
        gauge.expect_idle_count().return_const(initialized);
        gauge.expect_outstanding().return_const(0usize);
        gauge.expect_lifecycle().return_const(PoolLifecycle::Warming);
        gauge
    }

    #[test]
    fn test_from_counts() {
        assert_eq!(PoolStatus::from_counts(0, 5), PoolStatus::NotAvailable);
        assert_eq!(PoolStatus::from_counts(3, 5), PoolStatus::Creating);
        assert_eq!(PoolStatus::from_counts(5, 5), PoolStatus::Ok);
        assert_eq!(PoolStatus::from_counts(6, 5), PoolStatus::Ok);
    }

    #[test]
    fn test_report_reads_gauge() {
        let reporter = StatusReporter::new(Arc::new(gauge(2, 5)));
        assert_eq!(reporter.report(), PoolStatus::Creating);
        assert_eq!(reporter.report(), PoolStatus::Creating);

        let reporter = StatusReporter::new(Arc::new(gauge(0, 5)));
        assert_eq!(reporter.report(), PoolStatus::NotAvailable);
    }

    #[test]
    fn test_snapshot_serialization() {
        let reporter = StatusReporter::new(Arc::new(gauge(5, 5)));
        let snapshot = reporter.snapshot();
        assert!(snapshot.status.is_ok());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "OK");
        assert_eq!(json["lifecycle"], "WARMING");
        assert_eq!(json["target"], 5);
    }

    #[test]
    fn test_display() {
        assert_eq!(PoolStatus::NotAvailable.to_string(), "NOT_AVAILABLE");
        assert_eq!(PoolStatus::Creating.to_string(), "CREATING");
    }
}
