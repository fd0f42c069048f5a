//! The byte-stream transport boundary.
//!
//! The concrete stream — sockets, the encryption handshake — is the
//! embedding's concern. This module defines only what the protocol layer
//! consumes: ordered delivery of structured values and raw byte ranges,
//! with every fault surfacing as a "broken connection" condition that
//! forces the owning connection manager into reacquisition.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

/// Fault surfaced by a [`Transport`].
///
/// All variants are terminal for the connection: the handle must be
/// discarded and a new one acquired.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying stream failed mid-unit.
    #[error("broken connection: {0}")]
    Broken(#[from] std::io::Error),

    /// Peer closed the stream.
    #[error("connection closed by peer")]
    Closed,

    /// The stream position held a different unit kind than required.
    #[error("stream desynchronized: expected {expected}, got {got}")]
    Desync {
        /// Unit kind the reader required.
        expected: &'static str,
        /// Unit kind actually present.
        got: &'static str,
    },

    /// A raw unit's length did not match the announced length.
    #[error("raw unit length mismatch: expected {expected} bytes, got {got}")]
    LengthMismatch {
        /// Announced length.
        expected: usize,
        /// Actual unit length.
        got: usize,
    },

    /// A structured unit failed to encode or decode.
    #[error("invalid value encoding: {0}")]
    Codec(String),
}

/// An encrypted, ordered, bidirectional byte stream carrying structured
/// values and raw byte ranges.
///
/// Implementations must preserve unit order: a raw payload sent after a
/// structured message arrives after it, and the receiver must consume
/// units in the same order or observe a desync fault.
#[async_trait]
pub trait Transport: Send {
    /// Send one structured value.
    async fn send_value(&mut self, value: &Value) -> Result<(), TransportError>;

    /// Send one raw byte range.
    async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Receive the next structured value.
    async fn receive_value(&mut self) -> Result<Value, TransportError>;

    /// Receive the next raw byte range, which must be exactly
    /// `expected_len` bytes.
    async fn receive_raw(&mut self, expected_len: usize) -> Result<Bytes, TransportError>;

    /// Close the stream. Idempotent.
    async fn close(&mut self) -> Result<(), TransportError>;
}

impl TransportError {
    /// Whether this fault indicates version skew / framing corruption
    /// rather than a plain broken pipe.
    #[must_use]
    pub fn is_desync(&self) -> bool {
        matches!(self, Self::Desync { .. } | Self::LengthMismatch { .. } | Self::Codec(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts_to_broken() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: TransportError = io.into();
        assert!(matches!(err, TransportError::Broken(_)));
        assert!(!err.is_desync());
    }

    #[test]
    fn desync_classification() {
        let err = TransportError::Desync {
            expected: "value",
            got: "raw",
        };
        assert!(err.is_desync());

        let err = TransportError::LengthMismatch {
            expected: 10,
            got: 7,
        };
        assert!(err.is_desync());

        assert!(!TransportError::Closed.is_desync());
    }

    #[test]
    fn display_is_informative() {
        let err = TransportError::Desync {
            expected: "raw",
            got: "value",
        };
        let msg = err.to_string();
        assert!(msg.contains("raw"));
        assert!(msg.contains("value"));
    }
}
