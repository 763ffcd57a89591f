//! Reconnect/backoff state machine.
//!
//! Pure bookkeeping with no I/O or timers: the connection task asks it what
//! to do after each transport event and performs the resulting action
//! itself. Every trigger is checked against the current phase, so duplicate
//! or late events (a second reconnect request, a close from a transport
//! that was already replaced) are ignored instead of racing.

use crate::config::BackoffConfig;
use std::fmt;
use std::time::Duration;

/// Lifecycle phase of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// Not started, or stopped
    #[default]
    Disconnected,
    /// Transport is being opened
    Connecting,
    /// Transport is open
    Connected,
    /// Waiting out the backoff delay before the next attempt
    ReconnectWaiting,
    /// Gave up; only a manual reconnect leaves this phase
    Failed,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Connected => "connected",
            ConnectionPhase::ReconnectWaiting => "reconnect-waiting",
            ConnectionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What to do after a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Sleep for `delay`, then connect again
    Retry { attempt: u32, delay: Duration },
    /// Attempt limit reached; stay down until a manual reconnect
    Exhausted { attempts: u32 },
    /// Failure arrived in a phase where no transport was live
    Ignored,
}

/// Tracks phase and attempt count for a single connection
#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    phase: ConnectionPhase,
    reconnect_attempts: u32,
    max_reconnect_attempts: u32,
    backoff: BackoffConfig,
    next_delay: Option<Duration>,
}

impl ReconnectMachine {
    pub fn new(max_reconnect_attempts: u32, backoff: BackoffConfig) -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            reconnect_attempts: 0,
            max_reconnect_attempts,
            backoff,
            next_delay: None,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts
    }

    /// Backoff delay scheduled by the last failure, while waiting
    pub fn next_delay(&self) -> Option<Duration> {
        self.next_delay
    }

    /// Start an attempt: on start-up or when the backoff timer fires.
    ///
    /// Returns `false` (and changes nothing) unless the machine is
    /// `Disconnected` or `ReconnectWaiting`.
    pub fn begin_connect(&mut self) -> bool {
        match self.phase {
            ConnectionPhase::Disconnected | ConnectionPhase::ReconnectWaiting => {
                self.phase = ConnectionPhase::Connecting;
                self.next_delay = None;
                true
            }
            _ => false,
        }
    }

    /// Transport opened. Resets the attempt counter.
    pub fn on_open(&mut self) -> bool {
        if self.phase != ConnectionPhase::Connecting {
            return false;
        }
        self.phase = ConnectionPhase::Connected;
        self.reconnect_attempts = 0;
        self.next_delay = None;
        true
    }

    /// Transport failed to open, closed, or errored.
    pub fn on_failure(&mut self) -> FailureOutcome {
        match self.phase {
            ConnectionPhase::Connecting | ConnectionPhase::Connected => {}
            _ => return FailureOutcome::Ignored,
        }

        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        if self.reconnect_attempts >= self.max_reconnect_attempts {
            self.phase = ConnectionPhase::Failed;
            self.next_delay = None;
            return FailureOutcome::Exhausted {
                attempts: self.reconnect_attempts,
            };
        }

        let delay = self.backoff.delay_for_attempt(self.reconnect_attempts);
        self.phase = ConnectionPhase::ReconnectWaiting;
        self.next_delay = Some(delay);
        FailureOutcome::Retry {
            attempt: self.reconnect_attempts,
            delay,
        }
    }

    /// User asked to reconnect now.
    ///
    /// Ignored while `Connecting` or `Connected`. Otherwise connects
    /// immediately with a fresh attempt counter, cutting any pending backoff
    /// short.
    pub fn manual_reset(&mut self) -> bool {
        match self.phase {
            ConnectionPhase::Connecting | ConnectionPhase::Connected => false,
            _ => {
                self.phase = ConnectionPhase::Connecting;
                self.reconnect_attempts = 0;
                self.next_delay = None;
                true
            }
        }
    }

    /// The user came back to the dashboard while it was not connected.
    ///
    /// Connects immediately but keeps the attempt counter, so repeated
    /// visibility flips cannot extend the retry budget. From `Failed` the
    /// client restarts from scratch, same as a manual reset.
    pub fn visibility_regained(&mut self) -> bool {
        match self.phase {
            ConnectionPhase::Connecting | ConnectionPhase::Connected => false,
            ConnectionPhase::Failed => self.manual_reset(),
            ConnectionPhase::Disconnected | ConnectionPhase::ReconnectWaiting => {
                self.phase = ConnectionPhase::Connecting;
                self.next_delay = None;
                true
            }
        }
    }

    /// Client stopped; forget everything.
    pub fn stop(&mut self) {
        self.phase = ConnectionPhase::Disconnected;
        self.reconnect_attempts = 0;
        self.next_delay = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(max: u32) -> ReconnectMachine {
        ReconnectMachine::new(max, BackoffConfig::default())
    }

    /// Drive one failed attempt from Connecting
    fn fail_once(m: &mut ReconnectMachine) -> FailureOutcome {
        let outcome = m.on_failure();
        if m.phase() == ConnectionPhase::ReconnectWaiting {
            assert!(m.begin_connect());
        }
        outcome
    }

    #[test]
    fn test_initial_state() {
        let m = machine(5);
        assert_eq!(m.phase(), ConnectionPhase::Disconnected);
        assert_eq!(m.reconnect_attempts(), 0);
        assert!(!m.is_connected());
        assert_eq!(m.next_delay(), None);
    }

    #[test]
    fn test_open_resets_attempts() {
        let mut m = machine(5);
        assert!(m.begin_connect());
        fail_once(&mut m);
        fail_once(&mut m);
        assert_eq!(m.reconnect_attempts(), 2);

        assert!(m.on_open());
        assert!(m.is_connected());
        assert_eq!(m.reconnect_attempts(), 0);
    }

    #[test]
    fn test_three_closes_schedule_eight_seconds() {
        let mut m = machine(5);
        m.begin_connect();
        m.on_open();

        for _ in 0..3 {
            m.on_failure();
            if m.reconnect_attempts() < 3 {
                m.begin_connect();
            }
        }

        assert_eq!(m.phase(), ConnectionPhase::ReconnectWaiting);
        assert_eq!(m.reconnect_attempts(), 3);
        assert_eq!(m.next_delay(), Some(Duration::from_millis(8000)));
    }

    #[test]
    fn test_failure_delays_follow_backoff() {
        let mut m = machine(10);
        m.begin_connect();

        let mut delays = Vec::new();
        for _ in 0..6 {
            match fail_once(&mut m) {
                FailureOutcome::Retry { delay, .. } => delays.push(delay.as_millis() as u64),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[test]
    fn test_exhaustion_reaches_failed() {
        let mut m = machine(5);
        m.begin_connect();

        for _ in 0..4 {
            assert!(matches!(fail_once(&mut m), FailureOutcome::Retry { .. }));
        }
        assert_eq!(fail_once(&mut m), FailureOutcome::Exhausted { attempts: 5 });
        assert_eq!(m.phase(), ConnectionPhase::Failed);

        // No automatic way out
        assert!(!m.begin_connect());
        assert_eq!(m.on_failure(), FailureOutcome::Ignored);
        assert_eq!(m.phase(), ConnectionPhase::Failed);
    }

    #[test]
    fn test_manual_reset_from_failed() {
        let mut m = machine(1);
        m.begin_connect();
        assert_eq!(m.on_failure(), FailureOutcome::Exhausted { attempts: 1 });

        assert!(m.manual_reset());
        assert_eq!(m.phase(), ConnectionPhase::Connecting);
        assert_eq!(m.reconnect_attempts(), 0);
    }

    #[test]
    fn test_triggers_ignored_while_connecting_or_connected() {
        let mut m = machine(5);
        m.begin_connect();
        assert!(!m.begin_connect());
        assert!(!m.manual_reset());
        assert!(!m.visibility_regained());

        m.on_open();
        assert!(!m.begin_connect());
        assert!(!m.manual_reset());
        assert!(!m.visibility_regained());
        assert!(m.is_connected());
    }

    #[test]
    fn test_visibility_keeps_counter_while_waiting() {
        let mut m = machine(5);
        m.begin_connect();
        m.on_failure();
        assert_eq!(m.phase(), ConnectionPhase::ReconnectWaiting);

        assert!(m.visibility_regained());
        assert_eq!(m.phase(), ConnectionPhase::Connecting);
        assert_eq!(m.reconnect_attempts(), 1);
        assert_eq!(m.next_delay(), None);
    }

    #[test]
    fn test_visibility_restarts_from_failed() {
        let mut m = machine(2);
        m.begin_connect();
        fail_once(&mut m);
        fail_once(&mut m);
        assert_eq!(m.phase(), ConnectionPhase::Failed);

        assert!(m.visibility_regained());
        assert_eq!(m.reconnect_attempts(), 0);
    }

    #[test]
    fn test_late_open_ignored() {
        let mut m = machine(5);
        assert!(!m.on_open());
        assert_eq!(m.phase(), ConnectionPhase::Disconnected);
    }
}
