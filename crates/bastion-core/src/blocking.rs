//! Offloading synchronous work (SQLite calls) off the async runtime.

use anyhow::{Result, anyhow};

/// Runs `f` on the blocking thread pool and waits for it.
///
/// A panic inside `f` comes back as an error instead of unwinding into the
/// caller's task.
pub async fn offload<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|err| {
        if err.is_panic() {
            anyhow!("blocking task panicked")
        } else {
            anyhow!("blocking task was cancelled")
        }
    })
}

/// Like [`offload`], for closures that return their own `Result`.
pub async fn offload_result<F, T, E>(f: F) -> Result<T>
where
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    offload(f).await?.map_err(Into::into)
}
