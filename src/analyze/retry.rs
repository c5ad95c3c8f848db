// src/analyze/retry.rs
//! Bounded retry for external calls. The outcome is a value; callers log.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `base × attempt`
    #[default]
    Linear,
    /// `base × 2^(attempt-1)`
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(20),
            max_delay: Duration::from_secs(120),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts. Handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: Backoff::Linear,
        }
    }

    /// Delay after failed attempt `attempt` (1-based), capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let d = match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        };
        d.min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T, E> {
    Success(T),
    /// Every attempt failed with a transient error.
    ExhaustedRetries { attempts: u32, last_error: E },
    /// Non-transient error; no further attempts were made.
    Fatal(E),
}

/// Run `op(attempt)` until it succeeds, fails with a non-transient error, or
/// `max_attempts` is reached. Sleeps on the calling task between attempts.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(v) => return RetryOutcome::Success(v),
            Err(e) if !is_transient(&e) => return RetryOutcome::Fatal(e),
            Err(e) => {
                if attempt >= max {
                    return RetryOutcome::ExhaustedRetries {
                        attempts: attempt,
                        last_error: e,
                    };
                }
                let delay = policy.delay_for(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_scale_with_attempt_and_cap() {
        let p = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(20),
            max_delay: Duration::from_secs(50),
            backoff: Backoff::Linear,
        };
        assert_eq!(p.delay_for(1), Duration::from_secs(20));
        assert_eq!(p.delay_for(2), Duration::from_secs(40));
        assert_eq!(p.delay_for(3), Duration::from_secs(50));

        let e = RetryPolicy {
            backoff: Backoff::Exponential,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            ..p
        };
        assert_eq!(e.delay_for(1), Duration::from_millis(500));
        assert_eq!(e.delay_for(3), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let out = run_with_retry(&RetryPolicy::immediate(3), |e: &&str| *e == "429", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("429")
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(out, RetryOutcome::Success("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let out: RetryOutcome<(), &str> =
            run_with_retry(&RetryPolicy::immediate(4), |e: &&str| *e == "429", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("401") }
            })
            .await;
        assert_eq!(out, RetryOutcome::Fatal("401"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(20),
            max_delay: Duration::from_secs(120),
            backoff: Backoff::Linear,
        };
        let out: RetryOutcome<(), &str> =
            run_with_retry(&policy, |_| true, |_| async { Err("429") }).await;
        assert_eq!(
            out,
            RetryOutcome::ExhaustedRetries {
                attempts: 3,
                last_error: "429"
            }
        );
    }
}
