//! The request dispatcher — three shapes over one contract.
//!
//! Every logical operation issued by the client goes through here. The
//! same underlying exchange is exposed three ways: awaited
//! ([`Dispatcher::inquire`]), callback ([`Dispatcher::queue`]), and
//! future ([`Dispatcher::queue_future`]). On a transport fault the
//! dispatcher kicks the link into reacquisition and surfaces
//! [`ClientError::Broken`]; the caller retries the whole operation once
//! the link is live — there is no resuming mid-operation, and no
//! cancelling an operation already on the wire.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use confab_proto::Inquiry;
use tokio::sync::oneshot;
use tracing::warn;

use crate::cache::Populate;
use crate::error::ClientError;
use crate::link::Link;

/// Serializes logical operations onto a [`Link`]'s connection.
#[derive(Clone)]
pub struct Dispatcher {
    link: Arc<Link>,
}

impl Dispatcher {
    /// Create a dispatcher over a link.
    pub fn new(link: Arc<Link>) -> Self {
        Self { link }
    }

    /// The underlying link.
    #[must_use]
    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    /// Issue one operation and await its typed outcome.
    ///
    /// Declared errors come back as [`ClientError::Wire`] values. A
    /// transport fault triggers reacquisition (at most one outstanding
    /// re-establishment across all concurrent callers) and surfaces as
    /// [`ClientError::Broken`].
    pub async fn inquire<I: Inquiry>(&self, inquiry: &I) -> Result<I::Output, ClientError> {
        let Some(conn) = self.link.current() else {
            return Err(ClientError::NotConnected);
        };
        match conn.call(inquiry).await {
            Ok(output) => Ok(output),
            Err(error) if error.is_transport() => {
                warn!(method = inquiry.method(), %error, "exchange hit transport fault, reacquiring");
                let _ = self.link.reacquire_after(&conn).await;
                Err(ClientError::Broken)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Issue one operation; resume the caller via callback on a spawned
    /// task.
    pub fn queue<I, S, F>(&self, inquiry: I, on_success: S, on_failure: F)
    where
        I: Inquiry + 'static,
        S: FnOnce(I::Output) + Send + 'static,
        F: FnOnce(ClientError) + Send + 'static,
    {
        let dispatcher = self.clone();
        let _ = tokio::spawn(async move {
            match dispatcher.inquire(&inquiry).await {
                Ok(output) => on_success(output),
                Err(error) => on_failure(error),
            }
        });
    }

    /// Issue one operation as a detachable future.
    ///
    /// Dropping the handle detaches the waiter only — the operation
    /// already on the wire runs to completion on the connection either
    /// way, so the stream stays aligned.
    pub fn queue_future<I>(&self, inquiry: I) -> DispatchFuture<I::Output>
    where
        I: Inquiry + 'static,
    {
        let dispatcher = self.clone();
        let (tx, rx) = oneshot::channel();
        let _ = tokio::spawn(async move {
            let result = dispatcher.inquire(&inquiry).await;
            let _ = tx.send(result);
        });
        DispatchFuture { rx }
    }
}

/// Pending outcome of a queued operation.
pub struct DispatchFuture<T> {
    rx: oneshot::Receiver<Result<T, ClientError>>,
}

impl<T> Future for DispatchFuture<T> {
    type Output = Result<T, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ClientError::Broken)))
    }
}

/// A cache population source backed by a dispatcher and an inquiry
/// template — the standard way a cell is wired to the network.
pub struct InquirySource<I> {
    dispatcher: Dispatcher,
    inquiry: I,
}

impl<I> InquirySource<I> {
    /// Pair a template with the dispatcher that will run it.
    pub fn new(dispatcher: Dispatcher, inquiry: I) -> Self {
        Self {
            dispatcher,
            inquiry,
        }
    }
}

#[async_trait]
impl<I> Populate<I::Output> for InquirySource<I>
where
    I: Inquiry,
    I::Output: Clone,
{
    async fn populate(&self) -> Result<I::Output, ClientError> {
        self.dispatcher.inquire(&self.inquiry).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
