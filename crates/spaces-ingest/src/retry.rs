//! Bounded exponential backoff for retryable pipeline steps.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use spaces_core::{Error, Result};

/// Run `op` up to `1 + max_retries` times, doubling the delay between
/// attempts. Only errors classified retryable (transient upstream) are
/// retried; everything else propagates immediately.
pub async fn with_backoff<T, F, Fut>(
    op_name: &str,
    max_retries: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = base_delay * 2u32.saturating_pow(attempt);
                warn!(
                    subsystem = "ingest",
                    component = "retry",
                    op = op_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retryable failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Convenience wrapper with the ingestion defaults.
pub async fn with_default_backoff<T, F, Fut>(op_name: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_backoff(
        op_name,
        spaces_core::defaults::INGEST_MAX_RETRIES,
        Duration::from_millis(spaces_core::defaults::INGEST_BACKOFF_BASE_MS),
        op,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let out = with_backoff("test", 3, Duration::from_millis(1), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Transient("blip".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_propagate_immediately() {
        let attempts = AtomicU32::new(0);
        let out: Result<()> = with_backoff("test", 3, Duration::from_millis(1), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Validation("bad".into())) }
        })
        .await;
        assert!(out.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_retries_returns_last_error() {
        let attempts = AtomicU32::new(0);
        let out: Result<()> = with_backoff("test", 2, Duration::from_millis(1), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Transient("still down".into())) }
        })
        .await;
        assert!(matches!(out, Err(Error::Transient(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
