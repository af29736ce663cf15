//! Poll an async operation until it succeeds or a fixed timeout elapses.
//!
//! Browsers deserialize the DOM on their own schedule, so the first lookup of
//! an element that is "about to exist" routinely fails. Every interaction in
//! [`crate::session`] funnels through [`retry_until`], which keeps re-running
//! the operation with a fixed delay between attempts and surfaces the last
//! driver error once the budget is spent.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Total timeout and the fixed per-attempt delay for [`retry_until`].
///
/// The delay exists so a tight lookup loop does not peg a core while the
/// browser is still rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Overall budget across all attempts.
    pub timeout: Duration,
    /// Sleep between a failed attempt and the next one.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(timeout: Duration, delay: Duration) -> Self {
        Self { timeout, delay }
    }

    /// Construct from millisecond counts, the unit the config file uses.
    pub fn from_millis(timeout_ms: u64, delay_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            delay: Duration::from_millis(delay_ms),
        }
    }

    /// Same policy with a different overall timeout. Used by the visibility
    /// checks that accept an override budget.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

/// Run `op` until it succeeds or `policy.timeout` elapses.
///
/// The first attempt starts immediately; the delay is slept only after a
/// failure. A zero timeout still gets exactly one attempt. On exhaustion the
/// error from the final attempt is returned unchanged.
pub async fn retry_until<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if started.elapsed() >= policy.timeout {
                    debug!(
                        target: "holdfast.retry",
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "budget exhausted; surfacing last error"
                    );
                    return Err(err);
                }
                debug!(
                    target: "holdfast.retry",
                    attempt,
                    error = %err,
                    "attempt failed; sleeping before retry"
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy() -> RetryPolicy {
        RetryPolicy::from_millis(200, 10)
    }

    #[tokio::test]
    async fn first_attempt_success_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result = retry_until(quick_policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(7)
        })
        .await
        .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_until(quick_policy(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 4 {
                Err(anyhow!("not yet"))
            } else {
                Ok("found")
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "found");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_the_last_error() {
        let calls = AtomicU32::new(0);
        let err = retry_until(RetryPolicy::from_millis(50, 10), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err::<(), _>(anyhow!("failure #{n}"))
        })
        .await
        .unwrap_err();

        let final_attempt = calls.load(Ordering::SeqCst);
        assert!(final_attempt > 1, "should have retried at least once");
        assert_eq!(err.to_string(), format!("failure #{final_attempt}"));
    }

    #[tokio::test]
    async fn zero_timeout_still_makes_one_attempt() {
        let calls = AtomicU32::new(0);
        let err = retry_until(RetryPolicy::from_millis(0, 10), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow!("no dice"))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.to_string(), "no dice");
    }

    #[tokio::test]
    async fn override_timeout_shortens_the_budget() {
        let policy = quick_policy().with_timeout(Duration::from_millis(0));
        let calls = AtomicU32::new(0);
        let _ = retry_until(policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow!("still failing"))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
