//! Jittered exponential backoff

use std::time::Duration;

use rand::Rng;

/// Backoff parameters for reconnects and write retries
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// First delay
    pub initial: Duration,

    /// Ceiling the delay doubles towards
    pub max: Duration,

    /// Randomise each delay within ±50% to avoid reconnect stampedes
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(60),
            jitter: true,
        }
    }
}

/// Stateful exponential backoff
#[derive(Debug)]
pub struct Backoff {
    conf: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(conf: BackoffConfig) -> Self {
        let current = conf.initial;
        Self { conf, current }
    }

    /// The next delay to sleep for
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.conf.max);
        if self.conf.jitter {
            base.mul_f64(rand::thread_rng().gen_range(0.5..1.5))
        } else {
            base
        }
    }

    /// Return to the initial delay after a success
    pub fn reset(&mut self) {
        self.current = self.conf.initial;
    }
}
