use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, histogram};

use crate::error::TradeError;

/// Metric names
pub const OPERATIONS_TOTAL: &str = "trade_thread_operations_total";
pub const OPERATION_DURATION: &str = "trade_thread_operation_duration_seconds";
pub const NOTIFICATIONS_TOTAL: &str = "trade_thread_notifications_total";

/// Metrics collection and management.
///
/// Every record call is forwarded to the `metrics` facade (a no-op until a
/// recorder is installed) and also tallied locally so the process can
/// report its own totals.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    operations: AtomicU64,
    rejections: AtomicU64,
    failures: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
}

/// Point-in-time copy of the local tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub operations: u64,
    pub rejections: u64,
    pub failures: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one exposed operation
    pub fn record_operation(&self, operation: &'static str, duration: Duration, error: Option<&TradeError>) {
        let outcome = match error {
            None => "success",
            Some(e) => e.kind(),
        };

        counter!(OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
        histogram!(OPERATION_DURATION, "operation" => operation).record(duration.as_secs_f64());

        self.operations.fetch_add(1, Ordering::Relaxed);
        match error {
            Some(e) if e.is_rejection() => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
            },
            Some(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            },
            None => {},
        }
    }

    /// Record the outcome of a completion notification
    pub fn record_notification(&self, delivered: bool) {
        let outcome = if delivered { "delivered" } else { "failed" };
        counter!(NOTIFICATIONS_TOTAL, "outcome" => outcome).increment(1);

        if delivered {
            self.notifications_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.notifications_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations: self.operations.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
        }
    }
}
