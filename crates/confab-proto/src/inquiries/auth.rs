//! Authorization and account operations.

use async_trait::async_trait;
use confab_core::{AuthToken, ErrorKind, UserGid};
use serde_json::{Value, json};

use super::methods;
use crate::inquiry::{Inquiry, InquiryError, field};
use crate::transport::Transport;

/// A minted identity: who you are and the capability to prove it later.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// The authenticated user.
    pub user: UserGid,
    /// Token for re-authorizing future connections.
    pub token: AuthToken,
}

fn parse_credentials(result: &Value) -> Result<Credentials, InquiryError> {
    Ok(Credentials {
        user: field(result, "user")?,
        token: field(result, "token")?,
    })
}

/// Present a stored token on a fresh connection, optionally declaring it
/// an event sink (fixed for the connection's remaining lifetime).
#[derive(Clone, Debug)]
pub struct Authorize {
    /// The capability minted at login/account creation.
    pub token: AuthToken,
    /// Request event-sink mode: the connection stops serving requests
    /// and becomes a receive-only notification channel.
    pub as_event_sink: bool,
}

#[async_trait]
impl Inquiry for Authorize {
    type Output = UserGid;

    fn method(&self) -> &'static str {
        methods::AUTHORIZE
    }

    fn build(&self) -> Option<Value> {
        Some(json!({
            "token": self.token.expose(),
            "asEventSink": self.as_event_sink,
        }))
    }

    fn declared_errors(&self) -> &'static [ErrorKind] {
        &[ErrorKind::Server, ErrorKind::Auth, ErrorKind::Restricted]
    }

    async fn parse_return_value(
        &self,
        result: Value,
        _transport: &mut dyn Transport,
    ) -> Result<UserGid, InquiryError> {
        field(&result, "user")
    }
}

/// Authenticate with name and secret.
#[derive(Clone, Debug)]
pub struct Login {
    /// Account name.
    pub name: String,
    /// Account secret.
    pub secret: String,
}

#[async_trait]
impl Inquiry for Login {
    type Output = Credentials;

    fn method(&self) -> &'static str {
        methods::LOGIN
    }

    fn build(&self) -> Option<Value> {
        Some(json!({"name": self.name, "secret": self.secret}))
    }

    fn declared_errors(&self) -> &'static [ErrorKind] {
        &[ErrorKind::Server, ErrorKind::Login, ErrorKind::RateLimit]
    }

    async fn parse_return_value(
        &self,
        result: Value,
        _transport: &mut dyn Transport,
    ) -> Result<Credentials, InquiryError> {
        parse_credentials(&result)
    }
}

/// Register a new account.
#[derive(Clone, Debug)]
pub struct CreateAccount {
    /// Desired account name.
    pub name: String,
    /// Desired secret.
    pub secret: String,
}

#[async_trait]
impl Inquiry for CreateAccount {
    type Output = Credentials;

    fn method(&self) -> &'static str {
        methods::CREATE_ACCOUNT
    }

    fn build(&self) -> Option<Value> {
        Some(json!({"name": self.name, "secret": self.secret}))
    }

    fn declared_errors(&self) -> &'static [ErrorKind] {
        &[
            ErrorKind::Server,
            ErrorKind::CreateAccount,
            ErrorKind::RateLimit,
        ]
    }

    async fn parse_return_value(
        &self,
        result: Value,
        _transport: &mut dyn Transport,
    ) -> Result<Credentials, InquiryError> {
        parse_credentials(&result)
    }
}
