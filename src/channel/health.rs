//! Message counters for one channel endpoint

use std::sync::atomic::{AtomicU64, Ordering};

/// Health metrics for a channel endpoint
///
/// All fields use atomic operations so the transport reader task and the
/// sending side can record concurrently.
#[derive(Debug, Default)]
pub struct ChannelHealth {
    /// Messages handed to the transport
    pub sent: AtomicU64,

    /// Frames from the peer role that decoded into a known command
    pub received: AtomicU64,

    /// Frames that were not valid JSON or carried an unknown `command`
    pub malformed: AtomicU64,

    /// Frames sent by an endpoint of our own role
    pub own_role_dropped: AtomicU64,

    /// Transport `post_message` failures
    pub send_failures: AtomicU64,
}

impl ChannelHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_own_role_dropped(&self) {
        self.own_role_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn own_role_dropped(&self) -> u64 {
        self.own_role_dropped.load(Ordering::Relaxed)
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            sent: self.sent(),
            received: self.received(),
            malformed: self.malformed(),
            own_role_dropped: self.own_role_dropped(),
            send_failures: self.send_failures(),
        }
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSummary {
    pub sent: u64,
    pub received: u64,
    pub malformed: u64,
    pub own_role_dropped: u64,
    pub send_failures: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Channel: {} sent ({} failed), {} received, {} malformed, {} own-role dropped",
            self.sent, self.send_failures, self.received, self.malformed, self.own_role_dropped
        )
    }
}
