//! Bounded retry of optimistic-concurrency conflicts.
//!
//! Uses `backon` for exponential backoff with jitter. Only
//! `LedgerError::ConcurrencyConflict` is retried; every other error is
//! returned on first sight.

use crate::config::RetryConfig;
use crate::error::Result;
use backon::{BackoffBuilder, ExponentialBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff for re-reading and re-applying a conflicting write.
pub fn conflict_backoff(config: &RetryConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_max_delay(Duration::from_millis(config.max_delay_ms))
        .with_max_times(config.max_retries)
        .with_jitter()
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or the
/// backoff is exhausted. Each attempt must re-read the state it mutates.
pub async fn retry_on_conflict<T, F, Fut>(backoff: ExponentialBuilder, what: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delays = backoff.build();
    let mut tries = 1usize;
    loop {
        match attempt().await {
            Err(e) if e.is_retryable() => match delays.next() {
                Some(delay) => {
                    warn!(target: "ledger::retry", what, tries, error = %e, "Conflicting write, retrying");
                    tokio::time::sleep(delay).await;
                    tries += 1;
                }
                None => return Err(e),
            },
            other => return other,
        }
    }
}
