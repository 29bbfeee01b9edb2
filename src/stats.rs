//! Statistics - Fallback outcome counters
//!
//! TigerStyle: Four monotonic atomic counters, derived rates computed on read.
//!
//! An instance is owned (via `Arc`) by each executor. Share one `Arc` between
//! executors to aggregate, or give each its own for isolation.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// One countable outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatEvent {
    /// An execution started
    Query,
    /// Escalation past the primary tier started
    FallbackUsed,
    /// Escalation produced data
    FallbackSucceeded,
    /// Escalation exhausted every legal tier
    FallbackFailed,
}

/// Thread-safe fallback counters.
#[derive(Debug, Default)]
pub struct FallbackStatistics {
    total_queries: AtomicU64,
    fallback_used: AtomicU64,
    fallback_success: AtomicU64,
    fallback_failed: AtomicU64,
}

impl FallbackStatistics {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one event.
    pub fn record(&self, event: StatEvent) {
        let counter = match event {
            StatEvent::Query => &self.total_queries,
            StatEvent::FallbackUsed => &self.fallback_used,
            StatEvent::FallbackSucceeded => &self.fallback_success,
            StatEvent::FallbackFailed => &self.fallback_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter and derive the rates.
    ///
    /// Counters are read individually; a snapshot taken while executions are
    /// in flight may mix counts from either side of an increment.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let total_queries = self.total_queries.load(Ordering::Relaxed);
        let fallback_used = self.fallback_used.load(Ordering::Relaxed);
        let fallback_success = self.fallback_success.load(Ordering::Relaxed);
        let fallback_failed = self.fallback_failed.load(Ordering::Relaxed);

        StatsSnapshot {
            total_queries,
            fallback_used,
            fallback_success,
            fallback_failed,
            fallback_usage_rate: percentage(fallback_used, total_queries),
            fallback_success_rate: percentage(fallback_success, fallback_used),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.total_queries.store(0, Ordering::Relaxed);
        self.fallback_used.store(0, Ordering::Relaxed);
        self.fallback_success.store(0, Ordering::Relaxed);
        self.fallback_failed.store(0, Ordering::Relaxed);
    }
}

/// Render `part / whole` as a percentage; `"0%"` when `whole` is zero.
#[must_use]
pub fn percentage(part: u64, whole: u64) -> String {
    if whole == 0 {
        return "0%".to_string();
    }
    #[allow(clippy::cast_precision_loss)]
    let rate = part as f64 / whole as f64 * 100.0;
    format!("{rate:.2}%")
}

/// Point-in-time view of [`FallbackStatistics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Executions started
    pub total_queries: u64,
    /// Executions that escalated past the primary tier
    pub fallback_used: u64,
    /// Escalations that produced data
    pub fallback_success: u64,
    /// Escalations that exhausted every legal tier
    pub fallback_failed: u64,
    /// `fallback_used / total_queries`
    pub fallback_usage_rate: String,
    /// `fallback_success / fallback_used`
    pub fallback_success_rate: String,
}

// =============================================================================
// Tests
// =============================================================================
