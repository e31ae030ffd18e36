//! Bounded retry around any advice generator.
//!
//! The orchestrator itself never retries. Wrap an advisor in [`WithRetry`]
//! to opt in. Delays use exponential backoff with full jitter, capped at
//! `max_delay`.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::domain::KeyFactor;
use crate::ports::{AdviceError, AdviceGenerator, RiskSummary};

/// Retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; 1 disables retries
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Upper bound of the jittered delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff_ceiling(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Advice generator decorator adding bounded retries.
#[derive(Debug)]
pub struct WithRetry<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: AdviceGenerator> WithRetry<A> {
    #[must_use]
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<A: AdviceGenerator> AdviceGenerator for WithRetry<A> {
    fn generate(&self, summary: &RiskSummary, key_factors: &[KeyFactor]) -> Result<Vec<String>, AdviceError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut rng = ChaCha20Rng::from_entropy();
        let mut attempt = 1;
        loop {
            match self.inner.generate(summary, key_factors) {
                Ok(recs) => return Ok(recs),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let ceiling = self.policy.backoff_ceiling(attempt);
                    let delay = if ceiling.is_zero() {
                        Duration::ZERO
                    } else {
                        rng.gen_range(Duration::ZERO..=ceiling)
                    };
                    tracing::warn!(
                        "Advice attempt {}/{} failed ({}), retrying in {:?}",
                        attempt,
                        attempts,
                        e,
                        delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RiskCategory;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl AdviceGenerator for Flaky {
        fn generate(&self, _: &RiskSummary, _: &[KeyFactor]) -> Result<Vec<String>, AdviceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(AdviceError::UpstreamTimeout(Duration::from_millis(10)))
            } else {
                Ok(vec!["ok".to_string()])
            }
        }
    }

    fn summary() -> RiskSummary {
        RiskSummary {
            combined_risk: 0.2,
            risk_category: RiskCategory::Low,
            retinal_risk: 0.0,
            lifestyle_risk: 0.22,
            dr_severity: None,
            age: None,
            bmi: None,
            physical_activity: None,
            sleep_hours: None,
            smoking: None,
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_retries_until_success() {
        let advisor = WithRetry::new(Flaky { failures: 2, calls: AtomicU32::new(0) }, policy(3));
        let recs = advisor.generate(&summary(), &[]).expect("Should succeed");
        assert_eq!(recs, vec!["ok".to_string()]);
        assert_eq!(advisor.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let advisor = WithRetry::new(Flaky { failures: 10, calls: AtomicU32::new(0) }, policy(2));
        assert!(advisor.generate(&summary(), &[]).is_err());
        assert_eq!(advisor.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_policy_does_not_retry() {
        let advisor = WithRetry::new(
            Flaky { failures: 1, calls: AtomicU32::new(0) },
            RetryPolicy::default(),
        );
        assert!(advisor.generate(&summary(), &[]).is_err());
        assert_eq!(advisor.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_ceiling_is_capped() {
        let p = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(p.backoff_ceiling(1), Duration::from_millis(100));
        assert_eq!(p.backoff_ceiling(2), Duration::from_millis(200));
        assert_eq!(p.backoff_ceiling(3), Duration::from_millis(350));
        assert_eq!(p.backoff_ceiling(40), Duration::from_millis(350));
    }
}
