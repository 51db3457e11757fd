use crate::core::errors::ExchangeError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::RetryIf;
use tracing::warn;

/// Bounded exponential backoff with an explicit retryable/fatal split
///
/// `max_retries` is the total number of attempts. The wait before attempt
/// `n + 1` is `base_delay * backoff_multiplier^(n - 1)`, so a policy of
/// `(3, 1s, 2.0)` sleeps 1s and then 2s at most.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    backoff_multiplier: f64,
    shutdown: Option<Arc<AtomicBool>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            shutdown: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        backoff_multiplier: f64,
    ) -> Result<Self, ExchangeError> {
        if max_retries == 0 {
            return Err(ExchangeError::ConfigurationError(
                "max_retries must allow at least one attempt".to_string(),
            ));
        }
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(ExchangeError::ConfigurationError(format!(
                "backoff multiplier must be a finite value >= 1.0, got {}",
                backoff_multiplier
            )));
        }

        Ok(Self {
            max_retries,
            base_delay,
            backoff_multiplier,
            shutdown: None,
        })
    }

    /// Stop starting new attempts once `flag` is raised
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Sleep durations between consecutive attempts
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base = self.base_delay.as_secs_f64();
        let multiplier = self.backoff_multiplier;
        (0..self.max_retries.saturating_sub(1)).map(move |i| {
            let secs = base * multiplier.powi(i as i32);
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        })
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Run `operation`, retrying failures that `ExchangeError::is_retryable` accepts
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, ExchangeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        if self.is_shutdown() {
            return Err(ExchangeError::Shutdown);
        }
        self.run_if(operation, ExchangeError::is_retryable).await
    }

    /// Run `operation`, retrying only failures for which `should_retry` is true
    ///
    /// The last failure is returned unchanged when attempts run out, when the
    /// failure is fatal, or when shutdown has been requested.
    pub async fn run_if<T, E, F, Fut, C>(&self, operation: F, mut should_retry: C) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnMut(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1u32;
        let mut delays = self.delays();
        let mut upcoming = delays.next();
        let condition = |error: &E| {
            if !should_retry(error) || self.is_shutdown() {
                return false;
            }
            if let Some(delay) = upcoming {
                warn!(
                    attempt,
                    max_attempts = self.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retryable failure, backing off"
                );
            }
            attempt += 1;
            upcoming = delays.next();
            true
        };

        RetryIf::start(self.delays(), operation, condition).await
    }
}
