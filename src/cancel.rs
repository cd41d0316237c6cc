//! Cancellation-aware waiting.
//!
//! Every suspension point in a session goes through these helpers so an
//! operator stop unwinds the current device with `ProvisionError::Cancelled`
//! instead of waiting out a sleep or an HTTP call.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{ProvisionError, ProvisionResult};

/// Sleep for `duration` unless `cancel` fires first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> ProvisionResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProvisionError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Drive `fut` to completion unless `cancel` fires first, in which case the
/// future is dropped.
pub async fn run_or_cancel<F, T>(fut: F, cancel: &CancellationToken) -> ProvisionResult<T>
where
    F: Future<Output = ProvisionResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProvisionError::Cancelled),
        result = fut => result,
    }
}

/// Fail fast when the token has already been cancelled.
pub fn check_cancelled(cancel: &CancellationToken) -> ProvisionResult<()> {
    if cancel.is_cancelled() {
        Err(ProvisionError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_cancel() {
        let cancel = CancellationToken::new();
        assert!(sleep_or_cancel(Duration::from_secs(5), &cancel).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = sleep_or_cancel(Duration::from_secs(3600), &cancel).await;
        assert!(matches!(result, Err(ProvisionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_or_cancel_drops_pending_future() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: ProvisionResult<()> =
            run_or_cancel(std::future::pending(), &cancel).await;
        assert!(matches!(result, Err(ProvisionError::Cancelled)));
        assert!(check_cancelled(&cancel).is_err());
    }
}
