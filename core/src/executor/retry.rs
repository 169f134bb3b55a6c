use std::time::Duration;

use crate::config::ExecutionConfig;

use super::traits::RetryStrategy;

/// Same delay before every retry.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    max_retries: u32,
    delay: Duration,
}

/// Doubles the delay per retry, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl FixedDelay {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn from_config(cfg: &ExecutionConfig) -> Self {
        Self::new(cfg.max_retries(), cfg.retry_delay())
    }
}

impl ExponentialBackoff {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }
}

impl RetryStrategy for FixedDelay {
    fn name(&self) -> &str {
        "fixed-delay"
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn next_delay(&self, _retry_count: u32) -> Duration {
        self.delay
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn next_delay(&self, retry_count: u32) -> Duration {
        let exp = 1u32 << retry_count.min(30);
        self.base_delay
            .checked_mul(exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
