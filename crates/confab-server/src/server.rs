//! TCP accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use confab_proto::StreamTransport;
use metrics::counter;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::registry::MethodRegistry;
use crate::session::run_session;

/// The listening server: accepts connections and spawns a session task
/// per connection, up to the configured cap.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    ctx: Arc<ServerContext>,
    registry: Arc<MethodRegistry>,
}

impl Server {
    /// Bind the configured address.
    pub async fn bind(
        config: ServerConfig,
        ctx: Arc<ServerContext>,
        registry: MethodRegistry,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.addr()).await?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(Self {
            listener,
            config,
            ctx,
            registry: Arc::new(registry),
        })
    }

    /// The bound address (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve until `shutdown` fires.
    ///
    /// Sessions observe the same token and wind down with the server;
    /// callers wanting a bounded drain wrap this in a
    /// [`ShutdownCoordinator`](crate::shutdown::ShutdownCoordinator).
    pub async fn serve(self, shutdown: CancellationToken) {
        let active = Arc::new(AtomicUsize::new(0));
        loop {
            let accepted = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(error) => {
                    warn!(%error, "accept failed");
                    continue;
                }
            };

            if active.load(Ordering::SeqCst) >= self.config.max_connections {
                counter!("connections_rejected_total").increment(1);
                warn!(%peer, "connection cap reached, dropping connection");
                drop(stream);
                continue;
            }

            counter!("connections_total").increment(1);
            let transport = StreamTransport::with_max_unit(stream, self.config.max_unit_size);
            let ctx = self.ctx.clone();
            let registry = self.registry.clone();
            let token = shutdown.clone();
            let event_buffer = self.config.event_buffer;
            let active = active.clone();
            let _ = active.fetch_add(1, Ordering::SeqCst);
            let _ = tokio::spawn(async move {
                run_session(Box::new(transport), ctx, registry, event_buffer, token).await;
                let _ = active.fetch_sub(1, Ordering::SeqCst);
            });
        }
        info!("accept loop stopped");
    }
}
