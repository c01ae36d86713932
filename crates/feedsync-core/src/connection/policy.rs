use std::time::Duration;

use rand::Rng;

/// Decides whether and when a dropped push channel is reopened.
pub trait ReconnectPolicy: Send {
    /// Delay before reconnect attempt `attempt` (1-based), or `None` to stop.
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;
}

/// Exponential backoff with optional jitter (±30%)
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
    pub jitter: bool,
}

impl ExponentialBackoff {
    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial.as_millis() as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max.as_millis() as f64) as u64)
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }
        let base = self.base_delay(attempt);
        if !self.jitter {
            return Some(base);
        }
        let factor = 1.0 + rand::rng().random_range(-0.3..0.3);
        Some(Duration::from_millis((base.as_millis() as f64 * factor) as u64))
    }
}

/// Never reconnects on its own; the operator reconnects explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualReconnect;

impl ReconnectPolicy for ManualReconnect {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }
}
