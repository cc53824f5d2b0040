//! Bounded retry with capped exponential backoff.
//!
//! Wraps a single provider call. Only transient failures are retried;
//! every other error is returned on first sight.

use super::provider::FetchError;
use rand::Rng;
use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^retry`, capped at `max`, with optional +/-50% jitter.
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, max, jitter } => {
                let scale = 2u32.saturating_pow(retry.min(16));
                let capped = base.saturating_mul(scale).min(max);
                if jitter && !capped.is_zero() {
                    let factor = rand::thread_rng().gen_range(0.5..1.5);
                    capped.mul_f64(factor).min(max)
                } else {
                    capped
                }
            }
        }
    }
}

/// How many times to try a fetch and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }

    /// Run `op`, sleeping the calling thread between attempts.
    pub fn run<T, F>(&self, op: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Result<T, FetchError>,
    {
        self.run_with_sleep(op, std::thread::sleep)
    }

    /// Run `op` with a caller-supplied sleep. `op` receives the 1-based
    /// attempt number.
    pub fn run_with_sleep<T, F, S>(&self, mut op: F, mut sleep: S) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Result<T, FetchError>,
        S: FnMut(Duration),
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.backoff.delay(attempt - 1);
                    tracing::debug!(attempt, ?delay, error = %e, "retrying fetch");
                    sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> Backoff {
        Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(350),
            jitter: false,
        }
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let b = no_jitter();
        assert_eq!(b.delay(0), Duration::from_millis(100));
        assert_eq!(b.delay(1), Duration::from_millis(200));
        assert_eq!(b.delay(2), Duration::from_millis(350));
        assert_eq!(b.delay(30), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_cap() {
        let b = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(150),
            jitter: true,
        };
        for retry in 0..10 {
            assert!(b.delay(retry) <= Duration::from_millis(150));
        }
    }

    #[test]
    fn transient_errors_are_retried_until_success() {
        let policy = RetryPolicy::new(3, no_jitter());
        let mut slept = Vec::new();
        let result = policy.run_with_sleep(
            |attempt| {
                if attempt < 3 {
                    Err(FetchError::Transient("503".into()))
                } else {
                    Ok(attempt)
                }
            },
            |d| slept.push(d),
        );
        assert_eq!(result, Ok(3));
        assert_eq!(
            slept,
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(2, no_jitter());
        let mut calls = 0;
        let result: Result<(), _> = policy.run_with_sleep(
            |_| {
                calls += 1;
                Err(FetchError::Transient("timeout".into()))
            },
            |_| {},
        );
        assert_eq!(calls, 2);
        assert_eq!(result, Err(FetchError::Transient("timeout".into())));
    }

    #[test]
    fn final_errors_are_not_retried() {
        let policy = RetryPolicy::new(5, no_jitter());
        let mut calls = 0;
        let result: Result<(), _> = policy.run_with_sleep(
            |_| {
                calls += 1;
                Err(FetchError::QuotaExceeded)
            },
            |_| {},
        );
        assert_eq!(calls, 1);
        assert_eq!(result, Err(FetchError::QuotaExceeded));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(0, no_jitter());
        let result = policy.run_with_sleep(|attempt| Ok::<_, FetchError>(attempt), |_| {});
        assert_eq!(result, Ok(1));
    }
}
