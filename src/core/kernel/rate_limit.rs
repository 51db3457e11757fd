use crate::core::errors::ExchangeError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Sliding-window limiter for outbound request starts
///
/// At every admission, the number of recorded starts younger than `period`
/// is at most `max_calls`. Waiters are served one at a time while the window
/// lock is held, which keeps the cap exact under concurrent callers.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, period: Duration) -> Result<Self, ExchangeError> {
        if max_calls == 0 {
            return Err(ExchangeError::ConfigurationError(
                "rate limiter max_calls must be positive".to_string(),
            ));
        }
        if period.is_zero() {
            return Err(ExchangeError::ConfigurationError(
                "rate limiter period must be positive".to_string(),
            ));
        }

        Ok(Self {
            max_calls,
            period,
            window: Mutex::new(VecDeque::with_capacity(max_calls)),
        })
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait until one more call fits in the window, then record it
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;

        loop {
            let now = Instant::now();
            self.prune(&mut window, now);

            if window.len() < self.max_calls {
                window.push_back(now);
                return;
            }

            // Full: the oldest entry leaves the window at oldest + period
            if let Some(&oldest) = window.front() {
                let ready_at = oldest + self.period;
                debug!(
                    wait_ms = ready_at.saturating_duration_since(now).as_millis() as u64,
                    max_calls = self.max_calls,
                    "rate limit window full, waiting"
                );
                sleep_until(ready_at).await;
            }
        }
    }

    /// Number of starts currently inside the window
    pub async fn recent_calls(&self) -> usize {
        let mut window = self.window.lock().await;
        self.prune(&mut window, Instant::now());
        window.len()
    }

    fn prune(&self, window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = window.front() {
            if now.saturating_duration_since(oldest) >= self.period {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}
