//! Counters for the multiplexer
//!
//! Tracks:
//! - Requests submitted / rejected at submission
//! - Terminal outcomes by kind
//! - Releases, orphaned engine events and panicking callbacks
//! - Submit-to-completion latency

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::mux::outcome::Outcome;

#[derive(Default)]
pub struct MuxStats {
    pub submitted: AtomicU64,
    /// Refused by the engine before a handle was issued
    pub rejected: AtomicU64,

    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,

    pub released: AtomicU64,
    /// Finished-events with no matching transaction
    pub orphaned_events: AtomicU64,
    pub callback_panics: AtomicU64,

    /// Latency tracking (nanoseconds)
    pub total_latency_ns: AtomicU64,
    pub min_latency_ns: AtomicU64,
    pub max_latency_ns: AtomicU64,
}

impl MuxStats {
    pub fn new() -> Self {
        Self { min_latency_ns: AtomicU64::new(u64::MAX), ..Default::default() }
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: Outcome, latency_ns: u64) {
        match outcome {
            Outcome::Ok => self.succeeded.fetch_add(1, Ordering::Relaxed),
            Outcome::TransportError(_) => self.failed.fetch_add(1, Ordering::Relaxed),
            Outcome::Timeout => self.timed_out.fetch_add(1, Ordering::Relaxed),
        };
        self.record_latency(latency_ns);
    }

    pub fn record_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_orphaned(&self) {
        self.orphaned_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_callback_panic(&self) {
        self.callback_panics.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency_ns: u64) {
        self.total_latency_ns.fetch_add(latency_ns, Ordering::Relaxed);
        self.min_latency_ns.fetch_min(latency_ns, Ordering::Relaxed);
        self.max_latency_ns.fetch_max(latency_ns, Ordering::Relaxed);
    }

    pub fn completed(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
            + self.timed_out.load(Ordering::Relaxed)
    }

    pub fn avg_latency_ns(&self) -> u64 {
        let count = self.completed();
        if count == 0 {
            0
        } else {
            self.total_latency_ns.load(Ordering::Relaxed) / count
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let min = self.min_latency_ns.load(Ordering::Relaxed);
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            orphaned_events: self.orphaned_events.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
            avg_latency_us: self.avg_latency_ns() / 1000,
            min_latency_us: if min == u64::MAX { 0 } else { min / 1000 },
            max_latency_us: self.max_latency_ns.load(Ordering::Relaxed) / 1000,
        }
    }
}

/// Point-in-time copy of [`MuxStats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub released: u64,
    pub orphaned_events: u64,
    pub callback_panics: u64,
    pub avg_latency_us: u64,
    pub min_latency_us: u64,
    pub max_latency_us: u64,
}

impl StatsSnapshot {
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed + self.timed_out
    }

    /// Submitted but not yet finished
    pub fn in_flight(&self) -> u64 {
        self.submitted.saturating_sub(self.completed())
    }
}

/// Timer for measuring transaction latency
#[derive(Debug, Clone, Copy)]
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}
