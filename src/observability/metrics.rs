//! Metrics registry for the relay
//!
//! - Counters increase monotonically and reset only on process start
//! - `active_sessions` is the single gauge
//! - Thread-safe but lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::relay::lifecycle::CloseReason;
use crate::relay::errors::RelayError;

/// Operational counters of the relay
///
/// # Thread Safety
///
/// All counters use atomic operations with Relaxed ordering; readers only
/// need eventually consistent values.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Sessions that reached ACTIVE
    sessions_opened: AtomicU64,
    /// Sessions that reached CLOSED, whatever the path
    sessions_closed: AtomicU64,
    /// Requests rejected before the upgrade
    sessions_rejected: AtomicU64,
    /// Sessions currently running
    active_sessions: AtomicU64,
    /// Point frames written
    points_sent: AtomicU64,
    /// Decoded events the filter dropped
    events_filtered: AtomicU64,
    /// Payloads that failed to decode
    payloads_malformed: AtomicU64,
    /// Writes that missed their deadline
    write_timeouts: AtomicU64,
    /// Pings that could not be written
    heartbeat_failures: AtomicU64,
    /// Sessions closed for client silence
    idle_timeouts: AtomicU64,
    /// Lease or subscribe failures
    acquisition_failures: AtomicU64,
}

impl RelayMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Session lifecycle

    /// A session task started
    pub fn session_started(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// A session reached ACTIVE
    pub fn increment_sessions_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// A session reached CLOSED
    pub fn session_finished(&self, reason: &CloseReason) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);

        match reason {
            CloseReason::IdleTimeout => {
                self.idle_timeouts.fetch_add(1, Ordering::Relaxed);
            }
            CloseReason::Heartbeat(_) => {
                self.heartbeat_failures.fetch_add(1, Ordering::Relaxed);
            }
            CloseReason::Transport(RelayError::WriteTimeout) => {
                self.write_timeouts.fetch_add(1, Ordering::Relaxed);
            }
            CloseReason::Upstream(RelayError::Acquire(_))
            | CloseReason::Upstream(RelayError::Subscribe { .. }) => {
                self.acquisition_failures.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// A request was rejected before upgrading
    pub fn increment_sessions_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Data path

    /// Increment points sent
    pub fn increment_points_sent(&self) {
        self.points_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment filtered events
    pub fn increment_events_filtered(&self) {
        self.events_filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment malformed payloads
    pub fn increment_payloads_malformed(&self) {
        self.payloads_malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get active session count
    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            sessions_rejected: self.sessions_rejected.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            points_sent: self.points_sent.load(Ordering::Relaxed),
            events_filtered: self.events_filtered.load(Ordering::Relaxed),
            payloads_malformed: self.payloads_malformed.load(Ordering::Relaxed),
            write_timeouts: self.write_timeouts.load(Ordering::Relaxed),
            heartbeat_failures: self.heartbeat_failures.load(Ordering::Relaxed),
            idle_timeouts: self.idle_timeouts.load(Ordering::Relaxed),
            acquisition_failures: self.acquisition_failures.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub sessions_rejected: u64,
    pub active_sessions: u64,
    pub points_sent: u64,
    pub events_filtered: u64,
    pub payloads_malformed: u64,
    pub write_timeouts: u64,
    pub heartbeat_failures: u64,
    pub idle_timeouts: u64,
    pub acquisition_failures: u64,
}
