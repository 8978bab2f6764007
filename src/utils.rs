use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{DataError, Result};

/// Run `future` unless `cancel` fires first.
///
/// A token that is already cancelled short-circuits before the future is
/// polled, so no store work starts.
pub async fn cancellable<F, T>(cancel: &CancellationToken, operation: &'static str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(DataError::Cancelled { operation });
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(operation, "Operation cancelled");
            Err(DataError::Cancelled { operation })
        }
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn cancelled_token_never_polls_the_future() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let polled = AtomicBool::new(false);
        let result = cancellable(&cancel, "test", async {
            polled.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(DataError::Cancelled { operation: "test" })));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_future() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let result: Result<()> = cancellable(&cancel, "slow", async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(DataError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn result_passes_through_when_not_cancelled() {
        let cancel = CancellationToken::new();
        assert_eq!(cancellable(&cancel, "ok", async { Ok(7) }).await.unwrap(), 7);
    }
}
