//! # confab-proto
//!
//! The confab wire protocol: a custom request/response/event exchange
//! over a persistent, ordered, bidirectional byte stream.
//!
//! - [`frame`]: `Request` / `Response` / `Frame` wire shapes
//! - [`transport`]: the byte-stream boundary trait and its fault type
//! - [`codec`]: length-delimited framing over any `AsyncRead + AsyncWrite`
//! - [`inquiry`]: the operation contract — parameter encoding, optional
//!   auxiliary binary payloads, typed success/error decoding, and the
//!   declared-error check that turns undeclared kinds into protocol
//!   violations
//! - [`inquiries`]: the concrete operation set

#![deny(unsafe_code)]

pub mod codec;
pub mod frame;
pub mod inquiries;
pub mod inquiry;
pub mod transport;

pub use codec::StreamTransport;
pub use frame::{ErrorBody, Frame, Request, Response};
pub use inquiry::{Inquiry, InquiryError, Phase, exchange};
pub use transport::{Transport, TransportError};
