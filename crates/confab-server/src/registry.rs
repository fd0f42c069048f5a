//! Method registry and dispatch.
//!
//! Handlers are authorization-check-then-delegate shims; the registry
//! owns the cross-cutting rules: unknown methods, handler timeouts,
//! per-method metrics, and the auxiliary-payload drain contract. A
//! method that declares an auxiliary payload gets its announced size
//! extracted here so the session loop can drain the bytes *before* the
//! business outcome is known — they are already committed to the stream,
//! and leaving them unread would desynchronize the connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use confab_core::{UserGid, WireError};
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::warn;

use crate::context::ServerContext;

/// One authorized invocation as the handler sees it.
pub struct Call {
    /// The connection's authorized identity.
    pub user: UserGid,
    /// Request parameters.
    pub params: Option<Value>,
    /// Drained auxiliary payload, for methods that declare one.
    pub aux: Option<Bytes>,
}

/// A handler's successful outcome.
#[derive(Debug)]
pub struct Reply {
    /// Structured result.
    pub value: Value,
    /// Raw payload streamed after the response, if any.
    pub raw: Option<Bytes>,
}

impl Reply {
    /// A structured-only reply.
    #[must_use]
    pub fn value(value: Value) -> Self {
        Self { value, raw: None }
    }

    /// A reply followed by a raw payload.
    #[must_use]
    pub fn with_raw(value: Value, raw: Bytes) -> Self {
        Self {
            value,
            raw: Some(raw),
        }
    }
}

/// Announced auxiliary payload size, extracted from the request params.
pub type AuxExtractor = fn(Option<&Value>) -> Result<usize, WireError>;

/// Trait implemented by every method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the method for an authorized caller.
    async fn handle(&self, call: Call, ctx: &ServerContext) -> Result<Reply, WireError>;
}

struct HandlerEntry {
    handler: Arc<dyn MethodHandler>,
    aux: Option<AuxExtractor>,
}

/// Registry mapping method names to handlers.
#[derive(Default)]
pub struct MethodRegistry {
    entries: HashMap<String, HandlerEntry>,
}

impl MethodRegistry {
    /// Maximum time a single handler is allowed to run.
    const HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.entries.insert(
            method.to_owned(),
            HandlerEntry {
                handler: Arc::new(handler),
                aux: None,
            },
        );
    }

    /// Register a handler whose requests carry an auxiliary payload.
    pub fn register_with_aux(
        &mut self,
        method: &str,
        handler: impl MethodHandler + 'static,
        aux: AuxExtractor,
    ) {
        let _ = self.entries.insert(
            method.to_owned(),
            HandlerEntry {
                handler: Arc::new(handler),
                aux: Some(aux),
            },
        );
    }

    /// Whether a method is registered.
    #[must_use]
    pub fn has_method(&self, method: &str) -> bool {
        self.entries.contains_key(method)
    }

    /// All registered method names (sorted).
    #[must_use]
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// The announced auxiliary size for a method's request, when the
    /// method declares a payload. `None` means no payload to drain.
    #[must_use]
    pub fn aux_size(
        &self,
        method: &str,
        params: Option<&Value>,
    ) -> Option<Result<usize, WireError>> {
        let entry = self.entries.get(method)?;
        entry.aux.map(|extract| extract(params))
    }

    /// Dispatch an authorized call to its handler.
    ///
    /// Unknown methods are a malformed request (version skew), not a
    /// domain condition. A handler overrunning the timeout surfaces as a
    /// server fault.
    pub async fn dispatch(
        &self,
        method: &str,
        call: Call,
        ctx: &ServerContext,
    ) -> Result<Reply, WireError> {
        counter!("requests_total", "method" => method.to_owned()).increment(1);

        let Some(entry) = self.entries.get(method) else {
            counter!("request_errors_total", "method" => method.to_owned(), "error" => "unknown_method")
                .increment(1);
            warn!(method, "unknown method");
            return Err(WireError::Syntax);
        };

        let start = std::time::Instant::now();
        let outcome =
            tokio::time::timeout(Self::HANDLER_TIMEOUT, entry.handler.handle(call, ctx)).await;

        let result = match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(error)) => {
                counter!("request_errors_total", "method" => method.to_owned(), "error" => error.code())
                    .increment(1);
                Err(error)
            }
            Err(_elapsed) => {
                counter!("request_errors_total", "method" => method.to_owned(), "error" => "timeout")
                    .increment(1);
                tracing::error!(method, "handler timed out after {:?}", Self::HANDLER_TIMEOUT);
                Err(WireError::Server)
            }
        };

        let duration = start.elapsed();
        histogram!("request_duration_seconds", "method" => method.to_owned())
            .record(duration.as_secs_f64());
        if duration.as_secs() >= 5 {
            warn!(method, duration_secs = duration.as_secs_f64(), "slow request");
        }

        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl MethodHandler for EchoHandler {
        async fn handle(&self, call: Call, _ctx: &ServerContext) -> Result<Reply, WireError> {
            Ok(Reply::value(call.params.unwrap_or(Value::Null)))
        }
    }

    struct RestrictedHandler;

    #[async_trait]
    impl MethodHandler for RestrictedHandler {
        async fn handle(&self, _call: Call, _ctx: &ServerContext) -> Result<Reply, WireError> {
            Err(WireError::Restricted)
        }
    }

    fn call(params: Option<Value>) -> Call {
        Call {
            user: UserGid::new(),
            params,
            aux: None,
        }
    }

    fn size_extractor(params: Option<&Value>) -> Result<usize, WireError> {
        params
            .and_then(|p| p.get("size"))
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(WireError::Syntax)
    }

    #[tokio::test]
    async fn dispatch_success() {
        let ctx = ServerContext::fresh();
        let mut registry = MethodRegistry::new();
        registry.register("test.echo", EchoHandler);

        let reply = registry
            .dispatch("test.echo", call(Some(json!({"x": 1}))), &ctx)
            .await
            .unwrap();
        assert_eq!(reply.value["x"], 1);
        assert!(reply.raw.is_none());
    }

    #[tokio::test]
    async fn dispatch_unknown_method_is_syntax() {
        let ctx = ServerContext::fresh();
        let registry = MethodRegistry::new();
        assert_matches!(
            registry.dispatch("no.such", call(None), &ctx).await,
            Err(WireError::Syntax)
        );
    }

    #[tokio::test]
    async fn dispatch_handler_error_passes_through() {
        let ctx = ServerContext::fresh();
        let mut registry = MethodRegistry::new();
        registry.register("test.denied", RestrictedHandler);
        assert_matches!(
            registry.dispatch("test.denied", call(None), &ctx).await,
            Err(WireError::Restricted)
        );
    }

    #[tokio::test]
    async fn aux_size_absent_for_plain_methods() {
        let mut registry = MethodRegistry::new();
        registry.register("test.echo", EchoHandler);
        assert!(registry.aux_size("test.echo", None).is_none());
        assert!(registry.aux_size("unknown", None).is_none());
    }

    #[tokio::test]
    async fn aux_size_extracts_announced_length() {
        let mut registry = MethodRegistry::new();
        registry.register_with_aux("test.upload", EchoHandler, size_extractor);

        let params = json!({"size": 12});
        assert_matches!(
            registry.aux_size("test.upload", Some(&params)),
            Some(Ok(12))
        );
    }

    #[tokio::test]
    async fn aux_size_missing_announcement_is_syntax() {
        let mut registry = MethodRegistry::new();
        registry.register_with_aux("test.upload", EchoHandler, size_extractor);
        assert_matches!(
            registry.aux_size("test.upload", Some(&json!({}))),
            Some(Err(WireError::Syntax))
        );
        assert_matches!(
            registry.aux_size("test.upload", None),
            Some(Err(WireError::Syntax))
        );
    }

    #[tokio::test]
    async fn methods_are_sorted() {
        let mut registry = MethodRegistry::new();
        registry.register("b.m", EchoHandler);
        registry.register("a.m", EchoHandler);
        assert_eq!(registry.methods(), vec!["a.m", "b.m"]);
        assert!(registry.has_method("a.m"));
        assert!(!registry.has_method("c.m"));
    }

    #[tokio::test]
    async fn timeout_surfaces_as_server_fault() {
        struct StuckHandler;

        #[async_trait]
        impl MethodHandler for StuckHandler {
            async fn handle(&self, _call: Call, _ctx: &ServerContext) -> Result<Reply, WireError> {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Ok(Reply::value(Value::Null))
            }
        }

        tokio::time::pause();
        let ctx = ServerContext::fresh();
        let mut registry = MethodRegistry::new();
        registry.register("test.stuck", StuckHandler);
        assert_matches!(
            registry.dispatch("test.stuck", call(None), &ctx).await,
            Err(WireError::Server)
        );
    }
}
