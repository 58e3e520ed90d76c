//! Watch metrics tracking.
//!
//! Provides atomic counters for monitoring watch sessions. Recording is a
//! no-op when the metrics were created disabled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Metrics for watch sessions.
#[derive(Debug)]
pub struct WatchMetrics {
    /// Whether recording is enabled.
    enabled: bool,

    /// Total sessions opened.
    sessions_opened: AtomicU64,

    /// Total sessions closed.
    sessions_closed: AtomicU64,

    /// Total sessions ended by expiry.
    sessions_expired: AtomicU64,

    /// Total watches started.
    watches_started: AtomicU64,

    /// Total watches stopped by the client.
    watches_stopped: AtomicU64,

    /// Total start requests rejected.
    start_rejections: AtomicU64,

    /// Total events written to clients.
    events_sent: AtomicU64,

    /// Total upstream watch errors.
    upstream_errors: AtomicU64,

    /// Start time for uptime.
    start_time: Instant,
}

impl Default for WatchMetrics {
    fn default() -> Self {
        Self::new(true)
    }
}

impl WatchMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            sessions_expired: AtomicU64::new(0),
            watches_started: AtomicU64::new(0),
            watches_stopped: AtomicU64::new(0),
            start_rejections: AtomicU64::new(0),
            events_sent: AtomicU64::new(0),
            upstream_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Returns true if recording is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn incr(&self, counter: &AtomicU64) {
        if self.enabled {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a session opened.
    pub fn record_session_opened(&self) {
        self.incr(&self.sessions_opened);
    }

    /// Records a session closed.
    pub fn record_session_closed(&self) {
        self.incr(&self.sessions_closed);
    }

    /// Records a session expired.
    pub fn record_session_expired(&self) {
        self.incr(&self.sessions_expired);
    }

    /// Records a watch started.
    pub fn record_watch_started(&self) {
        self.incr(&self.watches_started);
    }

    /// Records a watch stopped by the client.
    pub fn record_watch_stopped(&self) {
        self.incr(&self.watches_stopped);
    }

    /// Records a rejected start request.
    pub fn record_start_rejected(&self) {
        self.incr(&self.start_rejections);
    }

    /// Records an event sent.
    pub fn record_event_sent(&self) {
        self.incr(&self.events_sent);
    }

    /// Records an upstream error.
    pub fn record_upstream_error(&self) {
        self.incr(&self.upstream_errors);
    }

    /// Returns the total sessions opened.
    #[must_use]
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::Relaxed)
    }

    /// Returns the total sessions closed.
    #[must_use]
    pub fn sessions_closed(&self) -> u64 {
        self.sessions_closed.load(Ordering::Relaxed)
    }

    /// Returns the current active sessions.
    #[must_use]
    pub fn active_sessions(&self) -> u64 {
        self.sessions_opened()
            .saturating_sub(self.sessions_closed())
    }

    /// Returns the total sessions expired.
    #[must_use]
    pub fn sessions_expired(&self) -> u64 {
        self.sessions_expired.load(Ordering::Relaxed)
    }

    /// Returns the total watches started.
    #[must_use]
    pub fn watches_started(&self) -> u64 {
        self.watches_started.load(Ordering::Relaxed)
    }

    /// Returns the total watches stopped.
    #[must_use]
    pub fn watches_stopped(&self) -> u64 {
        self.watches_stopped.load(Ordering::Relaxed)
    }

    /// Returns the total start rejections.
    #[must_use]
    pub fn start_rejections(&self) -> u64 {
        self.start_rejections.load(Ordering::Relaxed)
    }

    /// Returns the total events sent.
    #[must_use]
    pub fn events_sent(&self) -> u64 {
        self.events_sent.load(Ordering::Relaxed)
    }

    /// Returns the total upstream errors.
    #[must_use]
    pub fn upstream_errors(&self) -> u64 {
        self.upstream_errors.load(Ordering::Relaxed)
    }

    /// Returns the uptime.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> WatchMetricsSnapshot {
        WatchMetricsSnapshot {
            sessions_opened: self.sessions_opened(),
            sessions_closed: self.sessions_closed(),
            active_sessions: self.active_sessions(),
            sessions_expired: self.sessions_expired(),
            watches_started: self.watches_started(),
            watches_stopped: self.watches_stopped(),
            start_rejections: self.start_rejections(),
            events_sent: self.events_sent(),
            upstream_errors: self.upstream_errors(),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

/// A point-in-time snapshot of watch metrics.
#[derive(Debug, Clone, Serialize)]
pub struct WatchMetricsSnapshot {
    /// Total sessions opened.
    pub sessions_opened: u64,
    /// Total sessions closed.
    pub sessions_closed: u64,
    /// Active sessions.
    pub active_sessions: u64,
    /// Sessions ended by expiry.
    pub sessions_expired: u64,
    /// Watches started.
    pub watches_started: u64,
    /// Watches stopped by clients.
    pub watches_stopped: u64,
    /// Rejected start requests.
    pub start_rejections: u64,
    /// Events sent.
    pub events_sent: u64,
    /// Upstream errors.
    pub upstream_errors: u64,
    /// Uptime in seconds.
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = WatchMetrics::new(true);
        assert!(metrics.is_enabled());
        assert_eq!(metrics.sessions_opened(), 0);
        assert_eq!(metrics.active_sessions(), 0);
    }

    #[test]
    fn test_metrics_record_sessions() {
        let metrics = WatchMetrics::default();

        metrics.record_session_opened();
        metrics.record_session_opened();
        assert_eq!(metrics.active_sessions(), 2);

        metrics.record_session_closed();
        metrics.record_session_expired();
        assert_eq!(metrics.sessions_closed(), 1);
        assert_eq!(metrics.sessions_expired(), 1);
        assert_eq!(metrics.active_sessions(), 1);
    }

    #[test]
    fn test_metrics_record_watches() {
        let metrics = WatchMetrics::default();

        metrics.record_watch_started();
        metrics.record_watch_started();
        metrics.record_watch_stopped();
        metrics.record_start_rejected();
        metrics.record_upstream_error();

        assert_eq!(metrics.watches_started(), 2);
        assert_eq!(metrics.watches_stopped(), 1);
        assert_eq!(metrics.start_rejections(), 1);
        assert_eq!(metrics.upstream_errors(), 1);
    }

    #[test]
    fn test_metrics_disabled_records_nothing() {
        let metrics = WatchMetrics::new(false);

        metrics.record_session_opened();
        metrics.record_event_sent();
        metrics.record_watch_started();

        assert_eq!(metrics.sessions_opened(), 0);
        assert_eq!(metrics.events_sent(), 0);
        assert_eq!(metrics.watches_started(), 0);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = WatchMetrics::default();

        metrics.record_session_opened();
        metrics.record_event_sent();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sessions_opened, 1);
        assert_eq!(snapshot.active_sessions, 1);
        assert_eq!(snapshot.events_sent, 1);

        let json = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(json["events_sent"], 1);
    }
}
