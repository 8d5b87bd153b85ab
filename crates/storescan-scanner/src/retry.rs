//! Retry and pacing helpers for item page loads.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run `task_fn` up to `max_attempts` times with linear backoff
/// (`base_delay`, `2 * base_delay`, ...).
///
/// Stops retrying once `stop` is cancelled and returns the last error.
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut task_fn: F,
    max_attempts: u32,
    base_delay: Duration,
    stop: &CancellationToken,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match task_fn().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= max_attempts || stop.is_cancelled() {
                    return Err(e);
                }
                let delay = base_delay * attempt;
                tracing::warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = stop.cancelled() => return Err(e),
                }
                attempt += 1;
            }
        }
    }
}

/// `base` with up to 25% random jitter either way.
#[must_use]
pub fn jittered(base: Duration) -> Duration {
    let millis = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return Duration::ZERO;
    }
    let spread = millis / 4;
    let low = millis - spread;
    let high = millis.saturating_add(spread);
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

/// Sleep for a jittered `base`, waking early when `stop` is cancelled.
pub async fn pace(base: Duration, stop: &CancellationToken) {
    let delay = jittered(base);
    if delay.is_zero() {
        return;
    }
    tokio::select! {
        () = tokio::time::sleep(delay) => {}
        () = stop.cancelled() => {}
    }
}
