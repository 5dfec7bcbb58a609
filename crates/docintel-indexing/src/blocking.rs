//! Deadline-bounded execution of blocking store and index calls.

use std::time::Duration;

use crate::error::IndexingError;

/// Run a blocking closure on the blocking pool and bound it with `timeout`.
///
/// On timeout the closure keeps running to completion in the background;
/// its result is discarded.
pub(crate) async fn run_blocking<T, F>(
    operation: &'static str,
    timeout: Duration,
    f: F,
) -> Result<T, IndexingError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, IndexingError> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(IndexingError::Task(format!("{}: {}", operation, join_error))),
        Err(_) => Err(IndexingError::Timeout {
            operation,
            after: timeout,
        }),
    }
}
