//! Local rate limit resource
//!
//! A fixed-window rate limit owned by this process: `count` admissions per
//! `interval`. Callers receive the time remaining in the window when the
//! budget is spent.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use sluice_component::{RateLimit, Result};

struct Window {
    started_at: Instant,
    used: usize,
}

/// Fixed-window, process-local rate limit
pub struct LocalRateLimit {
    count: usize,
    interval: Duration,
    window: Mutex<Window>,
}

impl LocalRateLimit {
    /// Allow `count` admissions per `interval`
    pub fn new(count: usize, interval: Duration) -> Self {
        Self {
            count: count.max(1),
            interval,
            window: Mutex::new(Window {
                started_at: Instant::now(),
                used: 0,
            }),
        }
    }
}

#[async_trait]
impl RateLimit for LocalRateLimit {
    async fn access(&self) -> Result<Duration> {
        let mut window = self.window.lock().expect("rate limit poisoned");

        let elapsed = window.started_at.elapsed();
        if elapsed >= self.interval {
            window.started_at = Instant::now();
            window.used = 0;
        }

        if window.used < self.count {
            window.used += 1;
            Ok(Duration::ZERO)
        } else {
            Ok(self.interval.saturating_sub(window.started_at.elapsed()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admits_up_to_count() {
        let limit = LocalRateLimit::new(2, Duration::from_secs(60));
        assert_eq!(limit.access().await.unwrap(), Duration::ZERO);
        assert_eq!(limit.access().await.unwrap(), Duration::ZERO);
        assert!(limit.access().await.unwrap() > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limit = LocalRateLimit::new(1, Duration::from_millis(30));
        assert_eq!(limit.access().await.unwrap(), Duration::ZERO);
        assert!(limit.access().await.unwrap() > Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limit.access().await.unwrap(), Duration::ZERO);
    }
}
