use crate::config::KeepaliveConfig;
use tokio::time::{Duration, Instant};

/// Tracks application-level ping/pong for a single connection
#[derive(Debug)]
pub struct KeepaliveMonitor {
    config: KeepaliveConfig,

    /// When the connection opened; the first ping is one interval later
    connected_at: Instant,

    /// Time of last ping sent
    last_ping_sent: Option<Instant>,

    /// Time of last pong received
    last_pong_received: Option<Instant>,

    /// Whether a ping is still unanswered
    waiting_for_pong: bool,
}

impl KeepaliveMonitor {
    /// Create a monitor for a connection that just opened
    pub fn new(config: KeepaliveConfig) -> Self {
        Self {
            config,
            connected_at: Instant::now(),
            last_ping_sent: None,
            last_pong_received: None,
            waiting_for_pong: false,
        }
    }

    /// Record that we sent a ping
    pub fn record_ping_sent(&mut self) {
        self.last_ping_sent = Some(Instant::now());
        self.waiting_for_pong = true;
    }

    /// Record that we received a pong
    pub fn record_pong_received(&mut self) {
        self.last_pong_received = Some(Instant::now());
        self.waiting_for_pong = false;
    }

    fn next_ping_at(&self) -> Instant {
        self.last_ping_sent.unwrap_or(self.connected_at) + self.config.ping_interval
    }

    /// Check if we should send a ping now.
    ///
    /// Pings go out on a fixed period whether or not the previous one was
    /// answered.
    pub fn should_send_ping(&self) -> bool {
        Instant::now() >= self.next_ping_at()
    }

    /// Check if the outstanding ping has gone unanswered for too long.
    ///
    /// Always `false` when no pong timeout is configured.
    pub fn is_pong_overdue(&self) -> bool {
        match (self.config.pong_timeout, self.last_ping_sent) {
            (Some(timeout), Some(sent)) if self.waiting_for_pong => sent.elapsed() >= timeout,
            _ => false,
        }
    }

    /// Time until the next ping or pong deadline, whichever comes first
    pub fn time_until_next_check(&self) -> Duration {
        let now = Instant::now();
        let until_ping = self.next_ping_at().saturating_duration_since(now);

        match (self.config.pong_timeout, self.last_ping_sent) {
            (Some(timeout), Some(sent)) if self.waiting_for_pong => {
                until_ping.min((sent + timeout).saturating_duration_since(now))
            }
            _ => until_ping,
        }
    }

    /// Time since the last pong, if any arrived on this connection
    pub fn time_since_last_pong(&self) -> Option<Duration> {
        self.last_pong_received.map(|t| t.elapsed())
    }

    /// Whether a ping is still unanswered
    pub fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(pong_timeout: Option<Duration>) -> KeepaliveConfig {
        KeepaliveConfig {
            ping_interval: Duration::from_secs(30),
            pong_timeout,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_ping_after_one_interval() {
        let monitor = KeepaliveMonitor::new(test_config(None));
        assert!(!monitor.should_send_ping());
        assert_eq!(monitor.time_until_next_check(), Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(monitor.should_send_ping());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_pong_cycle() {
        let mut monitor = KeepaliveMonitor::new(test_config(None));
        tokio::time::advance(Duration::from_secs(30)).await;

        monitor.record_ping_sent();
        assert!(monitor.is_waiting_for_pong());
        assert!(!monitor.should_send_ping());

        monitor.record_pong_received();
        assert!(!monitor.is_waiting_for_pong());
        assert_eq!(monitor.time_since_last_pong(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pong_ignored_without_timeout() {
        let mut monitor = KeepaliveMonitor::new(test_config(None));
        monitor.record_ping_sent();

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(!monitor.is_pong_overdue());
        // Still pings on schedule
        assert!(monitor.should_send_ping());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_timeout() {
        let mut monitor = KeepaliveMonitor::new(test_config(Some(Duration::from_secs(10))));
        monitor.record_ping_sent();
        assert_eq!(monitor.time_until_next_check(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!monitor.is_pong_overdue());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(monitor.is_pong_overdue());

        monitor.record_pong_received();
        assert!(!monitor.is_pong_overdue());
    }
}
