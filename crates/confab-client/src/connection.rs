//! A live, authorized connection handle.

use confab_core::{Event, UserGid};
use confab_proto::{Frame, Inquiry, InquiryError, Transport, exchange};
use tokio::sync::Mutex;

/// Which way a connection was fixed at authorization time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Bidirectional: issues operations, receives their results.
    Request,
    /// Receive-only sink for server-pushed notifications.
    EventSink,
}

/// A ready connection: transport + fixed role + authorized identity.
///
/// The handle is exclusively owned by one [`Link`](crate::link::Link); a
/// caller holding it must treat it as valid only until a transport fault
/// surfaces, then ask the link to reacquire. The internal lock scopes one
/// full exchange (request, auxiliary payload, response) so concurrent
/// callers never interleave units on the stream.
pub struct Connection {
    role: Role,
    identity: UserGid,
    io: Mutex<Box<dyn Transport>>,
}

impl Connection {
    /// Wrap an authorized transport.
    pub fn new(transport: Box<dyn Transport>, role: Role, identity: UserGid) -> Self {
        Self {
            role,
            identity,
            io: Mutex::new(transport),
        }
    }

    /// The identity this connection was authorized as.
    #[must_use]
    pub fn identity(&self) -> UserGid {
        self.identity
    }

    /// The role fixed at authorization.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Run one full inquiry exchange.
    pub async fn call<I: Inquiry>(&self, inquiry: &I) -> Result<I::Output, InquiryError> {
        let mut io = self.io.lock().await;
        exchange(io.as_mut(), inquiry).await
    }

    /// Receive the next server-pushed event (event-sink role).
    ///
    /// An event connection only ever carries events; a response frame
    /// showing up here is a protocol violation.
    pub async fn next_event(&self) -> Result<Event, InquiryError> {
        let mut io = self.io.lock().await;
        let value = io
            .receive_value()
            .await
            .map_err(|source| InquiryError::Transport {
                phase: confab_proto::Phase::AwaitResponse,
                source,
            })?;
        match serde_json::from_value::<Frame>(value) {
            Ok(Frame::Event(event)) => Ok(event),
            Ok(Frame::Response(response)) => Err(InquiryError::illegal(format!(
                "response frame `{}` on an event connection",
                response.id
            ))),
            Err(error) => Err(InquiryError::illegal(format!(
                "malformed event frame: {error}"
            ))),
        }
    }

    /// Close the underlying transport. Best-effort; faults are ignored
    /// because the handle is being discarded anyway.
    pub async fn close(&self) {
        let mut io = self.io.lock().await;
        let _ = io.close().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_proto::codec::duplex_pair;

    #[tokio::test]
    async fn exposes_role_and_identity() {
        let (client, _server) = duplex_pair(1024);
        let user = UserGid::new();
        let conn = Connection::new(Box::new(client), Role::Request, user);
        assert_eq!(conn.identity(), user);
        assert_eq!(conn.role(), Role::Request);
    }

    #[tokio::test]
    async fn next_event_decodes_pushed_frame() {
        let (client, mut server) = duplex_pair(1024);
        let conn = Connection::new(Box::new(client), Role::EventSink, UserGid::new());

        use confab_proto::Transport as _;
        let event = confab_core::Event::new("user.notification");
        server
            .send_value(&serde_json::to_value(&event).unwrap())
            .await
            .unwrap();

        let received = conn.next_event().await.unwrap();
        assert_eq!(received.event_type, "user.notification");
    }

    #[tokio::test]
    async fn response_frame_on_event_connection_is_illegal() {
        let (client, mut server) = duplex_pair(1024);
        let conn = Connection::new(Box::new(client), Role::EventSink, UserGid::new());

        use confab_proto::{Response, Transport as _};
        let stray = Response::success("r1", serde_json::json!({}));
        server
            .send_value(&serde_json::to_value(&stray).unwrap())
            .await
            .unwrap();

        let err = conn.next_event().await.unwrap_err();
        assert!(matches!(err, InquiryError::IllegalProtocol { .. }));
    }

    #[tokio::test]
    async fn next_event_on_dead_peer_is_transport_fault() {
        let (client, server) = duplex_pair(1024);
        drop(server);
        let conn = Connection::new(Box::new(client), Role::EventSink, UserGid::new());
        let err = conn.next_event().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn close_is_quiet_even_when_peer_is_gone() {
        let (client, server) = duplex_pair(1024);
        drop(server);
        let conn = Connection::new(Box::new(client), Role::Request, UserGid::new());
        conn.close().await;
        conn.close().await;
    }
}
