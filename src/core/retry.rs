//! Whole-run retry: reruns the *entire* reconciliation, not a single
//! transfer, while the previous attempt still reported errors. Retries the
//! whole sync run, async, with a fixed delay between passes rather than
//! backoff — successive passes converge because objects transferred in an
//! earlier pass are detected as already-equal in the next, not because of
//! induced backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Anything the retry loop can introspect to learn whether the reported
/// outcome still needs another attempt.
pub trait AttemptOutcome {
    fn errors(&self) -> u64;
}

/// Run `attempt` up to `retries + 1` times (one initial pass plus
/// `retries` retries), stopping early the first time a pass reports zero
/// errors. Returns the last outcome once the budget is exhausted; it is
/// the caller's job to treat a nonzero `errors()` on the final outcome as
/// run failure: the orchestrator returns failure iff errors > 0 after all
/// retries are exhausted.
pub async fn with_retry<T, F, Fut>(retries: u32, delay: Duration, mut attempt: F) -> Result<T>
where
    T: AttemptOutcome,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut outcome = attempt().await?;

    for pass in 1..=retries {
        if outcome.errors() == 0 {
            break;
        }
        tracing::info!(pass, retries, errors = outcome.errors(), "retrying whole sync run");
        tokio::time::sleep(delay).await;
        outcome = attempt().await?;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Outcome(u64);
    impl AttemptOutcome for Outcome {
        fn errors(&self) -> u64 {
            self.0
        }
    }

    #[tokio::test]
    async fn stops_immediately_on_zero_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Outcome(0)) }
        })
        .await
        .unwrap();

        assert_eq!(result.errors(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_errors_clear() {
        let calls = AtomicU32::new(0);
        let result = with_retry(5, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(Outcome(if n < 3 { 2 } else { 0 })) }
        })
        .await
        .unwrap();

        assert_eq!(result.errors(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_outcome_when_budget_exhausted() {
        let calls = AtomicU32::new(0);
        let result = with_retry(2, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Outcome(7)) }
        })
        .await
        .unwrap();

        assert_eq!(result.errors(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3); // 1 initial + 2 retries
    }
}
