//! Graceful shutdown coordination.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long to wait for tasks before giving up on them.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Hands one cancellation token to every server task and drains them on
/// shutdown.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// A coordinator with a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A clone of the token for a task to watch.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown, then wait up to `timeout` for the given tasks.
    ///
    /// Tasks still running after the timeout are left to the runtime;
    /// their token is cancelled, so they exit at their next await on it.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "draining tasks"
        );

        let all = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!("drain timed out after {timeout:?}, some tasks still running");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clean() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutting_down());
    }

    #[test]
    fn shutdown_reaches_every_token() {
        let coordinator = ShutdownCoordinator::new();
        let a = coordinator.token();
        let b = coordinator.token();
        coordinator.shutdown();
        coordinator.shutdown();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn drain_waits_for_cooperative_tasks() {
        let coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });
        coordinator.drain(vec![handle], None).await;
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn drain_times_out_on_stubborn_tasks() {
        let coordinator = ShutdownCoordinator::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        coordinator
            .drain(vec![handle], Some(Duration::from_millis(50)))
            .await;
        assert!(coordinator.is_shutting_down());
    }
}
