//! Media handlers — the operations that interleave raw payload with the
//! structured exchange.

use async_trait::async_trait;
use confab_core::{MediaGid, WireError};
use serde_json::{Value, json};

use crate::context::ServerContext;
use crate::registry::{Call, MethodHandler, Reply};

/// Announced upload size, read from the request params.
///
/// Registered as the aux extractor for `media.upload`: the session loop
/// drains this many bytes before the handler's verdict matters.
pub fn upload_aux_size(params: Option<&Value>) -> Result<usize, WireError> {
    params
        .and_then(|p| p.get("size"))
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or(WireError::Syntax)
}

/// `media.upload` — store the drained blob.
pub struct UploadMediaHandler;

#[async_trait]
impl MethodHandler for UploadMediaHandler {
    async fn handle(&self, call: Call, ctx: &ServerContext) -> Result<Reply, WireError> {
        let bytes = call.aux.ok_or(WireError::Syntax)?;
        let media = ctx.media.store(bytes);
        Ok(Reply::value(json!({"media": media})))
    }
}

/// `media.download` — announce the size, then stream the blob.
pub struct DownloadMediaHandler;

#[async_trait]
impl MethodHandler for DownloadMediaHandler {
    async fn handle(&self, call: Call, ctx: &ServerContext) -> Result<Reply, WireError> {
        let media: MediaGid = call
            .params
            .as_ref()
            .and_then(|p| p.get("media"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .ok_or(WireError::Syntax)?;

        let bytes = ctx.media.fetch(media).ok_or(WireError::MediaNotFound {
            gid: Some(media.gid()),
        })?;
        Ok(Reply::with_raw(json!({"size": bytes.len()}), bytes))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use confab_core::UserGid;

    fn call(params: Option<Value>, aux: Option<Bytes>) -> Call {
        Call {
            user: UserGid::new(),
            params,
            aux,
        }
    }

    #[test]
    fn upload_aux_size_reads_announcement() {
        assert_matches!(upload_aux_size(Some(&json!({"size": 9}))), Ok(9));
        assert_matches!(upload_aux_size(Some(&json!({}))), Err(WireError::Syntax));
        assert_matches!(upload_aux_size(None), Err(WireError::Syntax));
        assert_matches!(
            upload_aux_size(Some(&json!({"size": "nine"}))),
            Err(WireError::Syntax)
        );
    }

    #[tokio::test]
    async fn upload_stores_drained_blob() {
        let ctx = ServerContext::fresh();
        let reply = UploadMediaHandler
            .handle(
                call(Some(json!({"size": 4})), Some(Bytes::from_static(b"data"))),
                &ctx,
            )
            .await
            .unwrap();

        let media: MediaGid = serde_json::from_value(reply.value["media"].clone()).unwrap();
        assert_eq!(ctx.media.fetch(media).unwrap(), Bytes::from_static(b"data"));
    }

    #[tokio::test]
    async fn upload_without_payload_is_syntax() {
        let ctx = ServerContext::fresh();
        assert_matches!(
            UploadMediaHandler
                .handle(call(Some(json!({"size": 4})), None), &ctx)
                .await,
            Err(WireError::Syntax)
        );
    }

    #[tokio::test]
    async fn download_round_trip() {
        let ctx = ServerContext::fresh();
        let media = ctx.media.store(Bytes::from_static(b"pixels"));

        let reply = DownloadMediaHandler
            .handle(call(Some(json!({"media": media})), None), &ctx)
            .await
            .unwrap();
        assert_eq!(reply.value["size"], 6);
        assert_eq!(reply.raw.unwrap(), Bytes::from_static(b"pixels"));
    }

    #[tokio::test]
    async fn download_unknown_is_media_not_found_with_gid() {
        let ctx = ServerContext::fresh();
        let media = MediaGid::new();
        assert_matches!(
            DownloadMediaHandler
                .handle(call(Some(json!({"media": media})), None), &ctx)
                .await,
            Err(WireError::MediaNotFound { gid: Some(g) }) if g == media.gid()
        );
    }

    #[tokio::test]
    async fn download_without_params_is_syntax() {
        let ctx = ServerContext::fresh();
        assert_matches!(
            DownloadMediaHandler.handle(call(None, None), &ctx).await,
            Err(WireError::Syntax)
        );
    }
}
