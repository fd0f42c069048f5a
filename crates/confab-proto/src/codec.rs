//! Length-delimited stream framing.
//!
//! Every unit on the wire is a length-prefixed blob whose first byte tags
//! it as either a structured JSON value or a raw byte range. The framing
//! is generic over the stream type, so a TLS- or otherwise-encrypted
//! stream plugs in unchanged.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::transport::{Transport, TransportError};

/// Unit tag: structured JSON value.
const TAG_VALUE: u8 = 0x01;
/// Unit tag: raw byte range.
const TAG_RAW: u8 = 0x02;

/// Default maximum unit size (payload + tag).
pub const DEFAULT_MAX_UNIT: usize = 16 * 1024 * 1024;

fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_VALUE => "value",
        TAG_RAW => "raw",
        _ => "unknown",
    }
}

/// [`Transport`] implementation over any ordered byte stream.
pub struct StreamTransport<S> {
    framed: Framed<S, LengthDelimitedCodec>,
    closed: bool,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a stream with the default unit size limit.
    pub fn new(stream: S) -> Self {
        Self::with_max_unit(stream, DEFAULT_MAX_UNIT)
    }

    /// Wrap a stream with an explicit unit size limit.
    pub fn with_max_unit(stream: S, max_unit: usize) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(max_unit)
            .new_codec();
        Self {
            framed: Framed::new(stream, codec),
            closed: false,
        }
    }

    /// Read the next unit and split off its tag byte.
    async fn next_unit(&mut self) -> Result<(u8, BytesMut), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.framed.next().await {
            Some(Ok(mut unit)) => {
                if unit.is_empty() {
                    return Err(TransportError::Codec("empty unit".into()));
                }
                let tag = unit.split_to(1)[0];
                Ok((tag, unit))
            }
            Some(Err(e)) => Err(e.into()),
            None => Err(TransportError::Closed),
        }
    }

    async fn send_unit(&mut self, tag: u8, payload: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut unit = BytesMut::with_capacity(payload.len() + 1);
        unit.extend_from_slice(&[tag]);
        unit.extend_from_slice(payload);
        self.framed.send(unit.freeze()).await?;
        Ok(())
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_value(&mut self, value: &Value) -> Result<(), TransportError> {
        let payload =
            serde_json::to_vec(value).map_err(|e| TransportError::Codec(e.to_string()))?;
        self.send_unit(TAG_VALUE, &payload).await
    }

    async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.send_unit(TAG_RAW, bytes).await
    }

    async fn receive_value(&mut self) -> Result<Value, TransportError> {
        let (tag, payload) = self.next_unit().await?;
        if tag != TAG_VALUE {
            return Err(TransportError::Desync {
                expected: "value",
                got: tag_name(tag),
            });
        }
        serde_json::from_slice(&payload).map_err(|e| TransportError::Codec(e.to_string()))
    }

    async fn receive_raw(&mut self, expected_len: usize) -> Result<Bytes, TransportError> {
        let (tag, payload) = self.next_unit().await?;
        if tag != TAG_RAW {
            return Err(TransportError::Desync {
                expected: "raw",
                got: tag_name(tag),
            });
        }
        if payload.len() != expected_len {
            return Err(TransportError::LengthMismatch {
                expected: expected_len,
                got: payload.len(),
            });
        }
        Ok(payload.freeze())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            self.framed.close().await?;
        }
        Ok(())
    }
}

/// A connected in-memory transport pair, for tests and loopback use.
#[must_use]
pub fn duplex_pair(
    buffer: usize,
) -> (StreamTransport<DuplexStream>, StreamTransport<DuplexStream>) {
    let (a, b) = tokio::io::duplex(buffer);
    (StreamTransport::new(a), StreamTransport::new(b))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
