//! Exponential backoff and the polling combinator built on it.

use crate::errors::{DriftsyncError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const MIN_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(20);
const FACTOR: f64 = 1.5;

/// Exponential backoff: 1s scaled by 1.5 per attempt, capped at 20s, with no
/// attempt limit. One instance tracks one polling phase; reset between phases.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff {
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay for a given attempt number without advancing state.
    pub fn for_attempt(&self, attempt: u32) -> Duration {
        let scaled = MIN_DELAY.as_secs_f64() * FACTOR.powi(attempt as i32);
        if scaled >= MAX_DELAY.as_secs_f64() {
            MAX_DELAY
        } else {
            Duration::from_secs_f64(scaled)
        }
    }

    /// Next delay, advancing the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.for_attempt(self.attempt);
        self.attempt += 1;
        delay
    }
}

/// Outcome of one poll probe.
pub enum Poll<T> {
    Ready(T),
    /// Not ready yet; carries the observed status for logging.
    Pending(String),
}

/// Poll `probe` with exponential backoff until it yields a value.
///
/// `budget` bounds the summed backoff delays; once they would exceed it the
/// poll fails with a timeout. `None` polls without bound. Probe errors
/// propagate immediately; only pending statuses are retried.
pub async fn poll_until<T, F, Fut>(
    operation: &str,
    budget: Option<Duration>,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>>>,
{
    let mut backoff = Backoff::new();
    let mut waited = Duration::ZERO;

    loop {
        match probe().await? {
            Poll::Ready(value) => return Ok(value),
            Poll::Pending(status) => {
                let delay = backoff.next_delay();
                waited += delay;
                if let Some(budget) = budget {
                    if waited >= budget {
                        return Err(DriftsyncError::timeout(operation, waited));
                    }
                }
                debug!(
                    operation,
                    status = %status,
                    delay_ms = delay.as_millis() as u64,
                    "waiting before next poll"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
