use std::future::Future;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Runs `future` as a background task that can't take the process down.
///
/// Errors and panics are logged and end the task. Cancelling `cancel` aborts
/// the task; that counts as a normal exit.
pub(crate) fn spawn_supervised<F>(
    name: &'static str,
    cancel: CancellationToken,
    future: F,
) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut inner = tokio::spawn(future);
        tokio::select! {
            () = cancel.cancelled() => {
                inner.abort();
                let _ = (&mut inner).await;
                tracing::info!(task = name, "background task stopped");
            }
            joined = &mut inner => match joined {
                Ok(Ok(())) => tracing::info!(task = name, "background task finished"),
                Ok(Err(err)) => tracing::error!(task = name, "background task failed: {err:#}"),
                Err(err) if err.is_panic() => {
                    tracing::error!(task = name, "background task panicked");
                }
                Err(_) => tracing::info!(task = name, "background task stopped"),
            },
        }
    })
}
