//! The event-connection listener.
//!
//! Runs over a [`Link`] whose connections were authorized as event
//! sinks, decoding pushed [`Event`] frames and routing them by type to
//! registered handlers. Delivery is best-effort end to end: events
//! missed while the connection is being resurrected are gone, and
//! consumers needing certainty reconcile with a direct query after the
//! link is live again. No ordering is guaranteed relative to responses
//! of concurrently in-flight queries.

use std::sync::Arc;

use confab_core::Event;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::link::Link;

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Routes server-pushed events to per-type handlers.
pub struct EventListener {
    link: Arc<Link>,
    handlers: DashMap<String, Vec<Handler>>,
}

impl EventListener {
    /// Create a listener over an event-role link.
    pub fn new(link: Arc<Link>) -> Self {
        Self {
            link,
            handlers: DashMap::new(),
        }
    }

    /// The underlying link.
    #[must_use]
    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    /// Register a handler for an event type. Multiple handlers per type
    /// all fire, in registration order.
    pub fn on(&self, event_type: impl Into<String>, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.handlers
            .entry(event_type.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Receive and route events until `shutdown` fires.
    ///
    /// Starts the link if idle; a transport fault reacquires it and the
    /// loop continues on the fresh connection.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let Some(conn) = self.link.current() else {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    started = self.link.start() => match started {
                        Ok(()) => continue,
                        Err(error) => {
                            debug!(%error, "event link did not come up, listener exiting");
                            break;
                        }
                    },
                }
            };

            tokio::select! {
                () = shutdown.cancelled() => break,
                received = conn.next_event() => match received {
                    Ok(event) => self.dispatch(&event),
                    Err(error) if error.is_transport() => {
                        warn!(%error, "event connection lost, reacquiring");
                        tokio::select! {
                            () = shutdown.cancelled() => break,
                            reacquired = self.link.reacquire_after(&conn) => {
                                if reacquired.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Err(error) => {
                        // An undecodable frame is version skew; skip it
                        // rather than kill the connection.
                        warn!(%error, "dropping undecodable event frame");
                    }
                },
            }
        }
    }

    fn dispatch(&self, event: &Event) {
        let Some(handlers) = self.handlers.get(&event.event_type) else {
            debug!(event_type = %event.event_type, "no handler registered for event");
            return;
        };
        for handler in handlers.iter() {
            handler(event);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
