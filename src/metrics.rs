use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for observability
///
/// Counters for the connection and the frames that cross it. Use
/// `snapshot()` to get a point-in-time view of all metrics, or the
/// individual getters for specific values.
#[derive(Debug, Default)]
pub struct Metrics {
    connections_total: AtomicU64,
    reconnect_attempts_total: AtomicU64,
    reconnects_exhausted_total: AtomicU64,
    frames_received_total: AtomicU64,
    frames_sent_total: AtomicU64,
    malformed_frames_total: AtomicU64,
    unknown_frames_total: AtomicU64,
    pings_sent_total: AtomicU64,
    pongs_received_total: AtomicU64,
    dropped_sends_total: AtomicU64,
    errors_total: AtomicU64,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Getters ==========

    /// Get total connections established
    pub fn connections(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    /// Get total backoff retries scheduled
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts_total.load(Ordering::Relaxed)
    }

    /// Get how many times reconnection gave up
    pub fn reconnects_exhausted(&self) -> u64 {
        self.reconnects_exhausted_total.load(Ordering::Relaxed)
    }

    /// Get total text frames received
    pub fn frames_received(&self) -> u64 {
        self.frames_received_total.load(Ordering::Relaxed)
    }

    /// Get total frames sent
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent_total.load(Ordering::Relaxed)
    }

    /// Get total frames that failed to decode
    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames_total.load(Ordering::Relaxed)
    }

    /// Get total frames with an unrecognized type
    pub fn unknown_frames(&self) -> u64 {
        self.unknown_frames_total.load(Ordering::Relaxed)
    }

    /// Get total pings sent
    pub fn pings_sent(&self) -> u64 {
        self.pings_sent_total.load(Ordering::Relaxed)
    }

    /// Get total pongs received
    pub fn pongs_received(&self) -> u64 {
        self.pongs_received_total.load(Ordering::Relaxed)
    }

    /// Get total sends dropped because the client was not connected
    pub fn dropped_sends(&self) -> u64 {
        self.dropped_sends_total.load(Ordering::Relaxed)
    }

    /// Get total transport errors
    pub fn errors(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    // ========== Recording methods (called internally) ==========

    pub(crate) fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_attempt(&self) {
        self.reconnect_attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_exhausted(&self) {
        self.reconnects_exhausted_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_received(&self) {
        self.frames_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_sent(&self) {
        self.frames_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed_frame(&self) {
        self.malformed_frames_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unknown_frame(&self) {
        self.unknown_frames_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ping(&self) {
        self.pings_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pong(&self) {
        self.pongs_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_send(&self) {
        self.dropped_sends_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all metrics for export
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Acquire),
            reconnect_attempts_total: self.reconnect_attempts_total.load(Ordering::Acquire),
            reconnects_exhausted_total: self.reconnects_exhausted_total.load(Ordering::Acquire),
            frames_received_total: self.frames_received_total.load(Ordering::Acquire),
            frames_sent_total: self.frames_sent_total.load(Ordering::Acquire),
            malformed_frames_total: self.malformed_frames_total.load(Ordering::Acquire),
            unknown_frames_total: self.unknown_frames_total.load(Ordering::Acquire),
            pings_sent_total: self.pings_sent_total.load(Ordering::Acquire),
            pongs_received_total: self.pongs_received_total.load(Ordering::Acquire),
            dropped_sends_total: self.dropped_sends_total.load(Ordering::Acquire),
            errors_total: self.errors_total.load(Ordering::Acquire),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub reconnect_attempts_total: u64,
    pub reconnects_exhausted_total: u64,
    pub frames_received_total: u64,
    pub frames_sent_total: u64,
    pub malformed_frames_total: u64,
    pub unknown_frames_total: u64,
    pub pings_sent_total: u64,
    pub pongs_received_total: u64,
    pub dropped_sends_total: u64,
    pub errors_total: u64,
}
