//! Test support: an in-memory peer that answers inquiries from a
//! scripted handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use confab_core::UserGid;
use confab_proto::codec::duplex_pair;
use confab_proto::{Request, Response, Transport as _};

use crate::connection::{Connection, Role};
use crate::error::ClientError;
use crate::link::Acquire;

/// Per-request script: `Some(response)` answers, `None` kills the
/// connection mid-exchange.
pub(crate) type Script = Arc<dyn Fn(&Request) -> Option<Response> + Send + Sync>;

/// An [`Acquire`] whose connections are served in-memory by a script.
pub(crate) struct ScriptedAcquire {
    identity: UserGid,
    script: Script,
    connections: AtomicUsize,
}

impl ScriptedAcquire {
    pub(crate) fn new(script: impl Fn(&Request) -> Option<Response> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            identity: UserGid::new(),
            script: Arc::new(script),
            connections: AtomicUsize::new(0),
        })
    }

    pub(crate) fn identity(&self) -> UserGid {
        self.identity
    }

    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Acquire for ScriptedAcquire {
    async fn acquire(&self) -> Result<Connection, ClientError> {
        let (client, mut server) = duplex_pair(64 * 1024);
        let script = self.script.clone();
        let _ = tokio::spawn(async move {
            loop {
                let Ok(value) = server.receive_value().await else {
                    break;
                };
                let Ok(request) = serde_json::from_value::<Request>(value) else {
                    break;
                };
                let Some(response) = script(&request) else {
                    let _ = server.close().await;
                    break;
                };
                let Ok(encoded) = serde_json::to_value(&response) else {
                    break;
                };
                if server.send_value(&encoded).await.is_err() {
                    break;
                }
            }
        });
        let _ = self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Connection::new(
            Box::new(client),
            Role::Request,
            self.identity,
        ))
    }
}
