//! Server-pushed event structure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known event type strings.
pub mod types {
    /// A user's email address changed (another session should update its
    /// cached copy without a round trip).
    pub const EMAIL_CHANGED: &str = "user.email_changed";
    /// A new message was posted to a thread.
    pub const MESSAGE_POSTED: &str = "thread.message_posted";
    /// A notification was created for the user.
    pub const NOTIFICATION: &str = "user.notification";
    /// Thread metadata changed.
    pub const THREAD_UPDATED: &str = "thread.updated";
}

/// An asynchronous notification pushed to event-sink connections.
///
/// Delivery is best-effort and fire-and-forget; consumers must tolerate
/// receiving an event before or after the response of a concurrently
/// in-flight query touching the same state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type (e.g. `user.email_changed`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    /// Event payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Event {
    /// Create a new event with the current UTC timestamp.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            data: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}
