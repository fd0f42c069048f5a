//! Media transfer operations — the two that interleave raw payload with
//! the structured exchange.

use async_trait::async_trait;
use bytes::Bytes;
use confab_core::{ErrorKind, MediaGid};
use serde_json::{Value, json};

use super::methods;
use crate::inquiry::{Inquiry, InquiryError, field};
use crate::transport::{Transport, TransportError};

/// Upload a media blob.
///
/// The blob is streamed as an auxiliary unit directly after the request.
/// The server drains it even when it rejects the upload, because the
/// bytes are already committed to the stream.
#[derive(Clone, Debug)]
pub struct UploadMedia {
    /// Blob contents.
    pub bytes: Bytes,
}

#[async_trait]
impl Inquiry for UploadMedia {
    type Output = MediaGid;

    fn method(&self) -> &'static str {
        methods::UPLOAD_MEDIA
    }

    fn build(&self) -> Option<Value> {
        Some(json!({"size": self.bytes.len()}))
    }

    fn declared_errors(&self) -> &'static [ErrorKind] {
        &[
            ErrorKind::Server,
            ErrorKind::Restricted,
            ErrorKind::RateLimit,
        ]
    }

    async fn send_auxiliary(&self, transport: &mut dyn Transport) -> Result<(), TransportError> {
        transport.send_raw(&self.bytes).await
    }

    async fn parse_return_value(
        &self,
        result: Value,
        _transport: &mut dyn Transport,
    ) -> Result<MediaGid, InquiryError> {
        field(&result, "media")
    }
}

/// Download a media blob.
///
/// The response announces the size; the raw payload follows it on the
/// stream and is consumed during result parsing.
#[derive(Clone, Debug)]
pub struct DownloadMedia {
    /// Which blob to fetch.
    pub media: MediaGid,
}

#[async_trait]
impl Inquiry for DownloadMedia {
    type Output = Bytes;

    fn method(&self) -> &'static str {
        methods::DOWNLOAD_MEDIA
    }

    fn build(&self) -> Option<Value> {
        Some(json!({"media": self.media}))
    }

    fn declared_errors(&self) -> &'static [ErrorKind] {
        &[
            ErrorKind::Server,
            ErrorKind::Restricted,
            ErrorKind::MediaNotFound,
        ]
    }

    async fn parse_return_value(
        &self,
        result: Value,
        transport: &mut dyn Transport,
    ) -> Result<Bytes, InquiryError> {
        let size: usize = field(&result, "size")?;
        transport
            .receive_raw(size)
            .await
            .map_err(|source| InquiryError::Transport {
                phase: crate::inquiry::Phase::Parse,
                source,
            })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
