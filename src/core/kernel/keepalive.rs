use std::time::Duration;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};

/// What the connection should do after a keepalive tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveAction {
    /// Send a liveness frame
    Ping,
    /// A ping went unanswered for the whole pong timeout
    Expired,
}

/// Liveness timer for a Ready connection
///
/// Created on entering Ready and dropped on leaving it, which cancels it.
/// Any inbound frame counts as an answer to the outstanding ping.
#[derive(Debug)]
pub struct KeepAlive {
    interval: Duration,
    pong_timeout: Duration,
    ticker: Interval,
    awaiting: Option<Instant>,
}

impl KeepAlive {
    pub fn new(interval: Duration, pong_timeout: Duration) -> Self {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            pong_timeout,
            ticker,
            awaiting: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next thing to do. Cancel safe.
    pub async fn tick(&mut self) -> KeepAliveAction {
        match self.awaiting {
            Some(sent) => {
                tokio::select! {
                    _ = sleep_until(sent + self.pong_timeout) => KeepAliveAction::Expired,
                    _ = self.ticker.tick() => KeepAliveAction::Ping,
                }
            }
            None => {
                self.ticker.tick().await;
                self.awaiting = Some(Instant::now());
                KeepAliveAction::Ping
            }
        }
    }

    pub fn record_inbound(&mut self) {
        self.awaiting = None;
    }

    pub fn is_awaiting_pong(&self) -> bool {
        self.awaiting.is_some()
    }
}
