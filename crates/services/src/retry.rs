use std::future::Future;

use storage::repository::StorageError;

/// Run a store write, re-running it once if the store reports a conflict.
///
/// Only for writes that are safe to repeat: the failed attempt must have
/// rolled back, and applying the operation again must land the same state.
pub(crate) async fn once_on_conflict<T, F, Fut>(
    op: &'static str,
    mut attempt: F,
) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    match attempt().await {
        Err(StorageError::Conflict) => {
            tracing::warn!(op, "progress store conflict, retrying once");
            attempt().await
        }
        other => other,
    }
}
