//! The connection lifecycle manager.
//!
//! A [`Link`] owns exactly one live [`Connection`] at a time. When the
//! transport dies, the link runs its acquisition loop — backing off per
//! policy, forever — until a replacement is ready or the link is
//! stopped. The state is an explicit enum under one lock; there is no
//! nullable-handle convention.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::{BackoffPolicy, DoublingBackoff};
use crate::connection::Connection;
use crate::error::ClientError;

/// The "acquire one ready connection" primitive.
///
/// The embedding supplies the concrete establishment — socket, handshake,
/// reauthorization — as a single operation that either hands back a
/// ready, authorized [`Connection`] or fails.
#[async_trait]
pub trait Acquire: Send + Sync {
    /// Attempt one establishment.
    async fn acquire(&self) -> Result<Connection, ClientError>;
}

/// Lifecycle state, guarded by one lock.
enum LinkState {
    /// Not running.
    Idle,
    /// Acquisition loop in progress.
    Connecting,
    /// A live handle is installed.
    Ready(Arc<Connection>),
}

/// Owns one connection and resurrects it on failure.
pub struct Link {
    acquire: Arc<dyn Acquire>,
    policy: Arc<dyn BackoffPolicy>,
    state: Mutex<LinkState>,
    /// Serializes start/stop/reacquire so at most one acquisition loop
    /// is ever outstanding.
    gate: tokio::sync::Mutex<()>,
    token: Mutex<CancellationToken>,
}

impl Link {
    /// Create an idle link with the default backoff policy.
    pub fn new(acquire: Arc<dyn Acquire>) -> Self {
        Self::with_policy(acquire, Arc::new(DoublingBackoff::seconds()))
    }

    /// Create an idle link with an explicit backoff policy.
    pub fn with_policy(acquire: Arc<dyn Acquire>, policy: Arc<dyn BackoffPolicy>) -> Self {
        Self {
            acquire,
            policy,
            state: Mutex::new(LinkState::Idle),
            gate: tokio::sync::Mutex::new(()),
            token: Mutex::new(CancellationToken::new()),
        }
    }

    /// The live handle, or `None` while idle or connecting.
    ///
    /// A returned handle is valid only until the caller observes a
    /// transport fault, at which point it must call [`Link::reacquire`]
    /// (or [`Link::reacquire_after`]) before retrying.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Connection>> {
        match &*self.state.lock() {
            LinkState::Ready(conn) => Some(conn.clone()),
            LinkState::Idle | LinkState::Connecting => None,
        }
    }

    /// Whether the link currently holds a live handle.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.lock(), LinkState::Ready(_))
    }

    /// Start the link: acquire a first connection.
    ///
    /// No-op when already running (connecting counts as running). Blocks
    /// until the first connection is ready or the link is stopped.
    pub async fn start(&self) -> Result<(), ClientError> {
        let _gate = self.gate.lock().await;
        {
            let mut state = self.state.lock();
            match *state {
                LinkState::Ready(_) => return Ok(()),
                // With the gate held, `Connecting` can only be left over
                // from an acquisition future that was dropped mid-flight;
                // no loop is actually running, so acquire again.
                LinkState::Idle | LinkState::Connecting => *state = LinkState::Connecting,
            }
        }
        // The token is only ever swapped by `stop()`, so the one read
        // here is exactly the one a concurrent `stop()` cancels.
        let token = self.token.lock().clone();
        if token.is_cancelled() {
            *self.state.lock() = LinkState::Idle;
            return Err(ClientError::Cancelled);
        }
        match self.acquire_loop(&token).await {
            Ok(conn) => {
                info!(identity = %conn.identity(), "link ready");
                *self.state.lock() = LinkState::Ready(Arc::new(conn));
                Ok(())
            }
            Err(error) => {
                *self.state.lock() = LinkState::Idle;
                Err(error)
            }
        }
    }

    /// Stop the link.
    ///
    /// Interrupts an in-progress acquisition, closes the current
    /// connection, and marks the link idle. Idempotent; safe to call
    /// from any task while others are using the connection.
    pub async fn stop(&self) {
        // Cancelling first interrupts an acquisition loop that holds the
        // gate, which is what frees the gate for us.
        self.token.lock().cancel();
        let _gate = self.gate.lock().await;
        let previous = std::mem::replace(&mut *self.state.lock(), LinkState::Idle);
        if let LinkState::Ready(conn) = previous {
            conn.close().await;
            debug!("link stopped, connection closed");
        }
        // Arm the next start().
        *self.token.lock() = CancellationToken::new();
    }

    /// Close the existing handle (if any) and run the acquisition loop
    /// for a replacement, swapping it in atomically.
    ///
    /// A stopped link is not resurrected — that returns
    /// [`ClientError::NotConnected`]; only [`Link::start`] brings it
    /// back.
    ///
    /// Callers must not invoke this concurrently for the same failed
    /// handle — hold the same lock that guards your use of the
    /// connection, or use [`Link::reacquire_after`], which folds that
    /// discipline in.
    pub async fn reacquire(&self) -> Result<Arc<Connection>, ClientError> {
        let _gate = self.gate.lock().await;
        self.reacquire_locked().await
    }

    /// Reacquire only if `failed` is still the installed handle.
    ///
    /// When several callers observe the same fault, the first one in
    /// runs the loop; the rest find a fresh handle already swapped in
    /// and return it immediately — at most one outstanding
    /// re-establishment.
    pub async fn reacquire_after(
        &self,
        failed: &Arc<Connection>,
    ) -> Result<Arc<Connection>, ClientError> {
        let _gate = self.gate.lock().await;
        if let LinkState::Ready(current) = &*self.state.lock() {
            if !Arc::ptr_eq(current, failed) {
                return Ok(current.clone());
            }
        }
        self.reacquire_locked().await
    }

    async fn reacquire_locked(&self) -> Result<Arc<Connection>, ClientError> {
        let token = self.token.lock().clone();
        if token.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let previous = {
            let mut state = self.state.lock();
            // A stopped link stays stopped; only start() brings it back.
            if matches!(*state, LinkState::Idle) {
                return Err(ClientError::NotConnected);
            }
            std::mem::replace(&mut *state, LinkState::Connecting)
        };
        if let LinkState::Ready(conn) = previous {
            conn.close().await;
        }
        match self.acquire_loop(&token).await {
            Ok(conn) => {
                let conn = Arc::new(conn);
                info!(identity = %conn.identity(), "link reacquired");
                *self.state.lock() = LinkState::Ready(conn.clone());
                Ok(conn)
            }
            Err(error) => {
                *self.state.lock() = LinkState::Idle;
                Err(error)
            }
        }
    }

    /// Attempt establishment until one succeeds or the token fires.
    ///
    /// Failures are retried indefinitely; only cancellation terminates
    /// the loop without a connection.
    async fn acquire_loop(&self, token: &CancellationToken) -> Result<Connection, ClientError> {
        let mut failures: u32 = 0;
        loop {
            tokio::select! {
                () = token.cancelled() => return Err(ClientError::Cancelled),
                attempt = self.acquire.acquire() => match attempt {
                    Ok(conn) => return Ok(conn),
                    Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
                    Err(error) => {
                        failures = failures.saturating_add(1);
                        let delay = self.policy.delay(failures);
                        warn!(%error, failures, ?delay, "acquisition failed, backing off");
                        tokio::select! {
                            () = token.cancelled() => return Err(ClientError::Cancelled),
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
