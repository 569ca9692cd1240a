use std::{thread, time::Duration};

use crate::error::SyncResult;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

/// Bounded exponential backoff for transient remote failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn run<T, F>(&self, op: &str, f: F) -> SyncResult<T>
    where
        F: FnMut() -> SyncResult<T>,
    {
        self.run_with_sleep(op, f, thread::sleep)
    }

    fn run_with_sleep<T, F, S>(&self, op: &str, mut f: F, mut sleep: S) -> SyncResult<T>
    where
        F: FnMut() -> SyncResult<T>,
        S: FnMut(Duration),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match f() {
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    tracing::debug!(
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "retrying after transient failure"
                    );
                    sleep(delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
