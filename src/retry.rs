use crate::error::SynthesisError;
use crate::logw;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tokio_retry2::{Retry, RetryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    // Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 1,
        }
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        ExponentialBackoff::from_millis(self.base_delay_ms.max(1))
            .factor(2)
            .max_delay(Duration::from_millis(self.max_delay_ms.max(1)))
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1))
    }
}

pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, SynthesisError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SynthesisError>>,
{
    let attempts = AtomicUsize::new(0);
    let budget = policy.max_attempts.max(1);

    Retry::spawn(policy.strategy(), || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let fut = operation();
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(err) if err.is_transient() => {
                    if attempt < budget {
                        logw(format!(
                            "{label}: attempt {attempt}/{budget} failed, retrying: {err}"
                        ));
                    }
                    Err(RetryError::Transient {
                        err,
                        retry_after: None,
                    })
                }
                Err(err) => Err(RetryError::Permanent(err)),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn transient_then_success_within_budget() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(&RetryPolicy::immediate(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(SynthesisError::transient("stub", "429"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transient_beyond_budget_fails() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(&RetryPolicy::immediate(2), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SynthesisError::transient("stub", "timeout")) }
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(&RetryPolicy::immediate(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SynthesisError::permanent("stub", "quota exhausted")) }
        })
        .await;

        assert!(!result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
