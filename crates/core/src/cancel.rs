use crate::RetrievalError;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Races an external call against the request's cancellation token. The call
/// future is dropped (and so aborted) as soon as the token fires.
pub async fn until_cancelled<F, T>(cancel: &CancellationToken, call: F) -> Result<T, RetrievalError>
where
    F: Future<Output = Result<T, RetrievalError>>,
{
    if cancel.is_cancelled() {
        return Err(RetrievalError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RetrievalError::Cancelled),
        result = call => result,
    }
}
