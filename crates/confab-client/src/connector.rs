//! The production "acquire one connection" primitive.

use async_trait::async_trait;
use confab_core::AuthToken;
use confab_proto::codec::{DEFAULT_MAX_UNIT, StreamTransport};
use confab_proto::inquiries::Authorize;
use confab_proto::{Transport as _, exchange};
use tokio::net::TcpStream;
use tracing::debug;

use crate::connection::{Connection, Role};
use crate::error::ClientError;
use crate::link::Acquire;

/// Establishes one ready connection: TCP connect, framing, token
/// reauthorization, role selection.
///
/// An encrypted deployment swaps the plain stream for a TLS one at the
/// framing layer; nothing above the transport changes.
#[derive(Clone, Debug)]
pub struct Connector {
    /// Server address (`host:port`).
    pub addr: String,
    /// Token presented to reauthorize the fresh connection.
    pub token: AuthToken,
    /// Role the connection is fixed to at authorization.
    pub role: Role,
    /// Maximum framed unit size.
    pub max_unit: usize,
}

impl Connector {
    /// Connector for a bidirectional request connection.
    #[must_use]
    pub fn request(addr: impl Into<String>, token: AuthToken) -> Self {
        Self {
            addr: addr.into(),
            token,
            role: Role::Request,
            max_unit: DEFAULT_MAX_UNIT,
        }
    }

    /// Connector for a receive-only event connection.
    #[must_use]
    pub fn event_sink(addr: impl Into<String>, token: AuthToken) -> Self {
        Self {
            addr: addr.into(),
            token,
            role: Role::EventSink,
            max_unit: DEFAULT_MAX_UNIT,
        }
    }
}

#[async_trait]
impl Acquire for Connector {
    async fn acquire(&self) -> Result<Connection, ClientError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|_| ClientError::Broken)?;
        let mut transport = StreamTransport::with_max_unit(stream, self.max_unit);

        let authorize = Authorize {
            token: self.token.clone(),
            as_event_sink: self.role == Role::EventSink,
        };
        let identity = match exchange(&mut transport, &authorize).await {
            Ok(identity) => identity,
            Err(error) => {
                let _ = transport.close().await;
                return Err(error.into());
            }
        };
        debug!(%identity, role = ?self.role, "connection authorized");
        Ok(Connection::new(Box::new(transport), self.role, identity))
    }
}
