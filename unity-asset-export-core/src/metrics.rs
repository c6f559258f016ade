//! Export accounting and progress pacing
//!
//! Counters for batch outcomes and the rate limiter used for progress callbacks.

use crate::error::ExportError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// One failed item, kept only when a single object was exported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFailure {
    pub name: String,
    pub message: String,
}

/// Aggregated outcome of an export operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    pub success: usize,
    pub skip: usize,
    pub error: usize,
    pub failures: Vec<ExportFailure>,
}

impl ExportStats {
    pub fn total(&self) -> usize {
        self.success + self.skip + self.error
    }
}

/// Thread-safe export counters shared by pool workers
#[derive(Debug, Default)]
pub struct ExportCounters {
    success: AtomicUsize,
    skip: AtomicUsize,
    error: AtomicUsize,
    failures: Mutex<Vec<ExportFailure>>,
    keep_failures: bool,
}

impl ExportCounters {
    /// Counters for a batch: only aggregate numbers are reported
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for a single-object export: individual messages are kept
    pub fn with_failure_details() -> Self {
        Self {
            keep_failures: true,
            ..Self::default()
        }
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed item. Destination conflicts count as skips.
    pub fn record_failure(&self, name: &str, err: &ExportError) {
        if err.is_conflict() {
            warn!("file {} already exists, skip", name);
            self.skip.fetch_add(1, Ordering::Relaxed);
            return;
        }

        error!("failed to export {}: {}", name, err);
        self.error.fetch_add(1, Ordering::Relaxed);
        if self.keep_failures {
            if let Ok(mut failures) = self.failures.lock() {
                failures.push(ExportFailure {
                    name: name.to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    pub fn snapshot(&self) -> ExportStats {
        let failures = self
            .failures
            .lock()
            .map(|failures| failures.clone())
            .unwrap_or_default();
        ExportStats {
            success: self.success.load(Ordering::Relaxed),
            skip: self.skip.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
            failures,
        }
    }
}

/// Rate limiter for progress callbacks
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Whether an update may be emitted now. The first call always passes.
    pub fn ready(&self) -> bool {
        let Ok(mut last) = self.last.lock() else {
            return true;
        };
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_count_as_skips() {
        let counters = ExportCounters::new();
        counters.record_success();
        counters.record_failure("a.png", &ExportError::write_conflict("a.png"));
        counters.record_failure("b.png", &ExportError::Encode("bad".to_string()));

        let stats = counters.snapshot();
        assert_eq!(stats.success, 1);
        assert_eq!(stats.skip, 1);
        assert_eq!(stats.error, 1);
        assert!(stats.failures.is_empty());
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_single_export_keeps_messages() {
        let counters = ExportCounters::with_failure_details();
        counters.record_failure("b.png", &ExportError::Encode("bad".to_string()));
        counters.record_failure("c.png", &ExportError::write_conflict("c.png"));

        let stats = counters.snapshot();
        assert_eq!(stats.failures.len(), 1);
        assert_eq!(stats.failures[0].name, "b.png");
    }

    #[test]
    fn test_throttle_limits_rate() {
        let throttle = ProgressThrottle::new(Duration::from_secs(60));
        assert!(throttle.ready());
        assert!(!throttle.ready());

        let open = ProgressThrottle::new(Duration::ZERO);
        assert!(open.ready());
        assert!(open.ready());
    }
}
