use crate::error::{BuildError, Result};
use tokio_util::sync::CancellationToken;

/// A blocking unit of work run by [`join_ordered`].
pub type Producer<T> = Box<dyn FnOnce(&CancellationToken) -> Result<T> + Send + 'static>;

/// Run every producer concurrently on the blocking pool and wait for all of them.
///
/// Outputs come back in producer order. When producers fail, the error of the
/// lowest-indexed one wins, whatever order they finished in. Cancelling
/// `cancel` reaches every producer through its token.
pub async fn join_ordered<T: Send + 'static>(
    cancel: &CancellationToken,
    producers: Vec<Producer<T>>,
) -> Result<Vec<T>> {
    let handles: Vec<_> = producers
        .into_iter()
        .map(|producer| {
            let token = cancel.clone();
            tokio::task::spawn_blocking(move || producer(&token))
        })
        .collect();

    let mut outputs = Vec::with_capacity(handles.len());
    let mut first_error: Option<BuildError> = None;
    for handle in handles {
        let result = handle
            .await
            .unwrap_or_else(|err| Err(BuildError::TaskJoin(err.to_string())));
        match result {
            Ok(output) => outputs.push(output),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(outputs),
    }
}
