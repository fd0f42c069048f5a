//! Cancellable future view of a cache cell.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheCell;
use crate::error::ClientError;

/// A pending cache read with a cancel handle.
///
/// Cancellation succeeds only while this consumer is still a queued
/// waiter: it removes that one waiter from the queue without touching
/// the others. A consumer already promoted to populator finishes the
/// population regardless, so the queue behind it is never stranded.
pub struct CacheFuture<T> {
    rx: oneshot::Receiver<Result<T, ClientError>>,
    token: CancellationToken,
}

impl<T: Clone + Send + 'static> CacheFuture<T> {
    pub(crate) fn spawn(cell: CacheCell<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let task_token = token.clone();
        let _ = tokio::spawn(async move {
            let result = cell.get_cancellable(&task_token).await;
            let _ = tx.send(result);
        });
        Self { rx, token }
    }

    /// Request cancellation. The future then resolves to
    /// [`ClientError::Cancelled`] unless the value was already won.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl<T> Future for CacheFuture<T> {
    type Output = Result<T, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ClientError::Cancelled)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
