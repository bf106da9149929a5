//! Engine metrics
//!
//! Counters are shared by every tick an engine runs and updated with relaxed
//! atomics; [`EngineMetrics::snapshot`] copies them into a plain struct.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub ticks_started: AtomicU64,
    pub ticks_completed: AtomicU64,
    /// Ticks stopped by the iteration bound
    pub ticks_aborted: AtomicU64,
    /// Ticks stopped by any other engine error
    pub ticks_failed: AtomicU64,
    pub firings: AtomicU64,
    pub actions_invoked: AtomicU64,
    pub queries_invoked: AtomicU64,
    pub query_failures: AtomicU64,
}

impl EngineMetrics {
    /// Create a zeroed set of counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tick seeded by [`Engine::invoke`](crate::Engine::invoke)
    pub fn record_tick_started(&self) {
        self.ticks_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tick that reached fixpoint
    pub fn record_tick_completed(&self) {
        self.ticks_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tick aborted at the iteration bound
    pub fn record_tick_aborted(&self) {
        self.ticks_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tick that failed with any other engine error
    pub fn record_tick_failed(&self) {
        self.ticks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one (sync, frame) firing
    pub fn record_firing(&self) {
        self.firings.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one action invocation, seeding ones included
    pub fn record_action(&self) {
        self.actions_invoked.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one `where` query call
    pub fn record_query(&self) {
        self.queries_invoked.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a `where` query failure that dropped frames
    pub fn record_query_failure(&self) {
        self.query_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_started: self.ticks_started.load(Ordering::Relaxed),
            ticks_completed: self.ticks_completed.load(Ordering::Relaxed),
            ticks_aborted: self.ticks_aborted.load(Ordering::Relaxed),
            ticks_failed: self.ticks_failed.load(Ordering::Relaxed),
            firings: self.firings.load(Ordering::Relaxed),
            actions_invoked: self.actions_invoked.load(Ordering::Relaxed),
            queries_invoked: self.queries_invoked.load(Ordering::Relaxed),
            query_failures: self.query_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EngineMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ticks_started: u64,
    pub ticks_completed: u64,
    pub ticks_aborted: u64,
    pub ticks_failed: u64,
    pub firings: u64,
    pub actions_invoked: u64,
    pub queries_invoked: u64,
    pub query_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = EngineMetrics::new();
        metrics.record_tick_started();
        metrics.record_tick_started();
        metrics.record_tick_completed();
        metrics.record_firing();
        metrics.record_query_failure();

        let snap = metrics.snapshot();
        assert_eq!(snap.ticks_started, 2);
        assert_eq!(snap.ticks_completed, 1);
        assert_eq!(snap.firings, 1);
        assert_eq!(snap.query_failures, 1);
        assert_eq!(snap.actions_invoked, 0);
    }
}
