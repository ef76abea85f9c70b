//! Keep-alive bookkeeping.
//!
//! The write loop calls [`KeepAliveState::check`] on every tick. A ping is
//! sent once the link has been idle for `interval`, and repeated at most
//! every `timeout` while it stays idle. The connection is declared lost
//! when nothing has been received for
//! `timeout * max_retries + interval`.

use std::time::{Duration, Instant};

/// Keep-alive parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveConfig {
    /// Idle time before a ping is sent.
    pub interval: Duration,
    /// Time a single ping may stay unanswered.
    pub timeout: Duration,
    /// Unanswered pings tolerated before the link is lost.
    pub max_retries: u32,
}

impl KeepAliveConfig {
    pub fn new(interval: Duration, timeout: Duration, max_retries: u32) -> Self {
        Self {
            interval,
            timeout,
            max_retries,
        }
    }

    /// Idle time after which the connection is considered lost.
    pub fn loss_threshold(&self) -> Duration {
        self.timeout
            .saturating_mul(self.max_retries)
            .saturating_add(self.interval)
    }
}

/// Outcome of a keep-alive check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveAction {
    /// Nothing to do.
    Idle,
    /// Send a ping now.
    SendPing,
    /// The peer has been silent past the loss threshold.
    Lost,
}

/// Per-connection keep-alive timestamps.
#[derive(Debug, Clone)]
pub struct KeepAliveState {
    config: KeepAliveConfig,
    last_received: Instant,
    last_ping_sent: Option<Instant>,
}

impl KeepAliveState {
    pub fn new(config: KeepAliveConfig, now: Instant) -> Self {
        Self {
            config,
            last_received: now,
            last_ping_sent: None,
        }
    }

    pub fn config(&self) -> &KeepAliveConfig {
        &self.config
    }

    pub fn last_received(&self) -> Instant {
        self.last_received
    }

    /// Record an inbound frame.
    pub fn record_received(&mut self, now: Instant) {
        if now > self.last_received {
            self.last_received = now;
        }
    }

    /// Evaluate the link at `now`. Records the ping when one is due.
    pub fn check(&mut self, now: Instant) -> KeepAliveAction {
        let idle = now.saturating_duration_since(self.last_received);
        if idle > self.config.loss_threshold() {
            return KeepAliveAction::Lost;
        }

        if idle < self.config.interval {
            return KeepAliveAction::Idle;
        }

        let ping_due = match self.last_ping_sent {
            None => true,
            Some(sent) => now.saturating_duration_since(sent) >= self.config.timeout,
        };
        if ping_due {
            self.last_ping_sent = Some(now);
            KeepAliveAction::SendPing
        } else {
            KeepAliveAction::Idle
        }
    }
}
