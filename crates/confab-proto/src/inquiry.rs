//! The operation contract.
//!
//! An [`Inquiry`] is a reusable template for one logical remote call: a
//! method name, a parameter encoding, an optional auxiliary binary
//! payload, a success shape, and the fixed set of error kinds it may
//! legitimately produce. [`exchange`] binds a template to one transport
//! and drives the invocation through its phases to exactly one terminal
//! state.
//!
//! The declared-error check happens once, here: an error kind received
//! but not declared for the operation is an [`InquiryError::IllegalProtocol`]
//! fault — version skew, not a domain condition — and is logged before
//! being raised so it can never be silently swallowed.

use async_trait::async_trait;
use confab_core::{ErrorKind, WireError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::error;

use crate::frame::{Request, Response};
use crate::transport::{Transport, TransportError};

// ─────────────────────────────────────────────────────────────────────────────
// Phases
// ─────────────────────────────────────────────────────────────────────────────

/// Where an invocation was when a transport fault hit.
///
/// `built → sent → awaiting-response → terminal`; auxiliary transfer
/// sits between send and the response wait when the operation carries
/// binary payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Sending the structured request.
    Send,
    /// Streaming auxiliary binary payload.
    Auxiliary,
    /// Waiting for the structured response.
    AwaitResponse,
    /// Decoding the success value (may consume raw payload).
    Parse,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Send => "send",
            Self::Auxiliary => "auxiliary transfer",
            Self::AwaitResponse => "response wait",
            Self::Parse => "result parse",
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal failure of one invocation.
#[derive(Debug, Error)]
pub enum InquiryError {
    /// A declared error kind, returned as a typed value.
    #[error(transparent)]
    Wire(WireError),

    /// The peer violated the protocol contract (undeclared error kind,
    /// malformed frame, id mismatch) — a version-skew symptom.
    #[error("illegal protocol: {detail}")]
    IllegalProtocol {
        /// What was wrong with the exchange.
        detail: String,
    },

    /// The transport failed; the connection must be reacquired and the
    /// whole operation retried by the caller.
    #[error("transport fault during {phase}: {source}")]
    Transport {
        /// Invocation phase the fault hit.
        phase: Phase,
        /// The underlying fault.
        #[source]
        source: TransportError,
    },
}

impl InquiryError {
    /// Build an illegal-protocol fault.
    #[must_use]
    pub fn illegal(detail: impl Into<String>) -> Self {
        Self::IllegalProtocol {
            detail: detail.into(),
        }
    }

    /// Whether the connection itself is dead (vs. a typed or protocol
    /// outcome on a healthy connection).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Extract and deserialize a required field of a params/result object.
pub fn field<T: DeserializeOwned>(value: &Value, key: &str) -> Result<T, InquiryError> {
    let inner = value
        .get(key)
        .ok_or_else(|| InquiryError::illegal(format!("missing field `{key}`")))?;
    serde_json::from_value(inner.clone())
        .map_err(|e| InquiryError::illegal(format!("field `{key}`: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Inquiry trait and exchange
// ─────────────────────────────────────────────────────────────────────────────

/// A template for one logical remote call.
///
/// Templates are stateless and reusable; an invocation binds one to a
/// transport via [`exchange`].
#[async_trait]
pub trait Inquiry: Send + Sync {
    /// Decoded success value.
    type Output: Send + 'static;

    /// Operation name on the wire.
    fn method(&self) -> &'static str;

    /// Encode the parameters object, or `None` for parameterless calls.
    fn build(&self) -> Option<Value>;

    /// The closed set of error kinds this operation may produce.
    fn declared_errors(&self) -> &'static [ErrorKind];

    /// Stream auxiliary binary payload after the structured request.
    ///
    /// The server-side counterpart of an operation that declares this
    /// capability must drain the payload even when the business outcome
    /// does not need it — the bytes are already committed to the stream.
    async fn send_auxiliary(&self, transport: &mut dyn Transport) -> Result<(), TransportError> {
        let _ = transport;
        Ok(())
    }

    /// Decode the success value; responses carrying raw payload consume
    /// it from the transport here.
    async fn parse_return_value(
        &self,
        result: Value,
        transport: &mut dyn Transport,
    ) -> Result<Self::Output, InquiryError>;
}

fn fault(phase: Phase) -> impl FnOnce(TransportError) -> InquiryError {
    move |source| InquiryError::Transport { phase, source }
}

/// Drive one invocation of `inquiry` over `transport`.
///
/// Exactly one terminal state is reached: the decoded success value, a
/// declared [`WireError`], an illegal-protocol fault, or a transport
/// fault tagged with the phase it interrupted. There is no retry here —
/// retry, if any, is the caller's job after reacquiring the connection.
pub async fn exchange<I: Inquiry + ?Sized>(
    transport: &mut dyn Transport,
    inquiry: &I,
) -> Result<I::Output, InquiryError> {
    let request = Request::new(inquiry.method(), inquiry.build());
    let outgoing = serde_json::to_value(&request)
        .map_err(|e| InquiryError::illegal(format!("unencodable request: {e}")))?;

    transport
        .send_value(&outgoing)
        .await
        .map_err(fault(Phase::Send))?;
    inquiry
        .send_auxiliary(transport)
        .await
        .map_err(fault(Phase::Auxiliary))?;

    let incoming = transport
        .receive_value()
        .await
        .map_err(fault(Phase::AwaitResponse))?;
    let response: Response = serde_json::from_value(incoming)
        .map_err(|e| InquiryError::illegal(format!("malformed response frame: {e}")))?;

    if response.id != request.id {
        return Err(InquiryError::illegal(format!(
            "response id `{}` does not match request id `{}`",
            response.id, request.id
        )));
    }

    if response.success {
        let result = response
            .result
            .ok_or_else(|| InquiryError::illegal("success response missing result"))?;
        inquiry.parse_return_value(result, transport).await
    } else {
        let body = response
            .error
            .ok_or_else(|| InquiryError::illegal("failure response missing error body"))?;
        let Some(wire_error) = body.decode() else {
            error!(
                method = inquiry.method(),
                code = %body.code,
                "error outside the closed taxonomy — protocol/version mismatch"
            );
            return Err(InquiryError::illegal(format!(
                "error code `{}` outside the taxonomy",
                body.code
            )));
        };
        if inquiry.declared_errors().contains(&wire_error.kind()) {
            Err(InquiryError::Wire(wire_error))
        } else {
            error!(
                method = inquiry.method(),
                kind = %wire_error.kind(),
                "undeclared error kind — protocol/version mismatch"
            );
            Err(InquiryError::illegal(format!(
                "error kind {} not declared for {}",
                wire_error.kind(),
                inquiry.method()
            )))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
