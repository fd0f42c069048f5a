//! Client-facing error type.

use confab_core::WireError;
use confab_proto::InquiryError;
use thiserror::Error;

/// What a caller above the connection layer can observe.
///
/// Transport faults are collapsed to [`ClientError::Broken`]: by the time
/// a caller sees it, the lifecycle manager is already reacquiring, and
/// the caller's job is to retry the whole operation once the connection
/// is live again — never to resume mid-operation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A declared error kind returned by the server as a typed value.
    #[error(transparent)]
    Wire(WireError),

    /// The peer violated the protocol contract — version skew.
    #[error("illegal protocol: {detail}")]
    IllegalProtocol {
        /// What was wrong with the exchange.
        detail: String,
    },

    /// The connection died; retry after it is reacquired.
    #[error("communication broken")]
    Broken,

    /// No live connection and none being acquired.
    #[error("not connected")]
    NotConnected,

    /// The operation's waiter was cancelled before completion.
    #[error("cancelled")]
    Cancelled,
}

impl From<InquiryError> for ClientError {
    fn from(error: InquiryError) -> Self {
        match error {
            InquiryError::Wire(wire) => Self::Wire(wire),
            InquiryError::IllegalProtocol { detail } => Self::IllegalProtocol { detail },
            InquiryError::Transport { .. } => Self::Broken,
        }
    }
}

impl ClientError {
    /// Extract the typed wire error, if that is what this is.
    #[must_use]
    pub fn as_wire(&self) -> Option<&WireError> {
        match self {
            Self::Wire(wire) => Some(wire),
            _ => None,
        }
    }
}
