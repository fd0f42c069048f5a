//! Own-profile handlers.

use async_trait::async_trait;
use confab_core::{Event, WireError, event};
use serde_json::json;

use crate::context::ServerContext;
use crate::registry::{Call, MethodHandler, Reply};

/// `user.get_own` — the caller's own summary.
pub struct GetOwnUserHandler;

#[async_trait]
impl MethodHandler for GetOwnUserHandler {
    async fn handle(&self, call: Call, ctx: &ServerContext) -> Result<Reply, WireError> {
        let summary = ctx.directory.summary(call.user).ok_or(WireError::Server)?;
        Ok(Reply::value(json!({
            "user": summary.user,
            "name": summary.name,
            "email": summary.email,
        })))
    }
}

/// `user.get_email` — the caller's email address.
pub struct GetEmailHandler;

#[async_trait]
impl MethodHandler for GetEmailHandler {
    async fn handle(&self, call: Call, ctx: &ServerContext) -> Result<Reply, WireError> {
        let email = ctx.directory.email(call.user).ok_or(WireError::Server)?;
        Ok(Reply::value(json!({"email": email})))
    }
}

/// `user.change_email` — overwrite the caller's address and notify the
/// caller's other sessions.
pub struct ChangeEmailHandler;

#[async_trait]
impl MethodHandler for ChangeEmailHandler {
    async fn handle(&self, call: Call, ctx: &ServerContext) -> Result<Reply, WireError> {
        let new_email = call
            .params
            .as_ref()
            .and_then(|p| p.get("newEmail"))
            .and_then(|v| v.as_str())
            .ok_or(WireError::Syntax)?;

        ctx.directory.set_email(call.user, new_email)?;

        // The originating request connection is not a sink, so this
        // reaches exactly the user's *other* sessions.
        let notification = Event::new(event::types::EMAIL_CHANGED)
            .with_data(json!({"email": new_email}));
        let _ = ctx.roster.fire(&notification, &[call.user]);

        Ok(Reply::value(json!({})))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
