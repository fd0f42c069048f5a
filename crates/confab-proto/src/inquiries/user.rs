//! Own-profile operations.

use async_trait::async_trait;
use confab_core::{ErrorKind, UserGid};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::methods;
use crate::inquiry::{Inquiry, InquiryError, field};
use crate::transport::Transport;

/// The caller's own user summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnUser {
    /// The caller's identifier — equal to the connection's authorized
    /// identity.
    pub user: UserGid,
    /// Display name.
    pub name: String,
    /// Current email address.
    pub email: String,
}

/// Fetch the caller's own user summary.
#[derive(Clone, Copy, Debug, Default)]
pub struct GetOwnUser;

#[async_trait]
impl Inquiry for GetOwnUser {
    type Output = OwnUser;

    fn method(&self) -> &'static str {
        methods::GET_OWN_USER
    }

    fn build(&self) -> Option<Value> {
        None
    }

    fn declared_errors(&self) -> &'static [ErrorKind] {
        &[ErrorKind::Server, ErrorKind::Restricted]
    }

    async fn parse_return_value(
        &self,
        result: Value,
        _transport: &mut dyn Transport,
    ) -> Result<OwnUser, InquiryError> {
        serde_json::from_value(result)
            .map_err(|e| InquiryError::illegal(format!("malformed user summary: {e}")))
    }
}

/// Fetch the caller's email address.
#[derive(Clone, Copy, Debug, Default)]
pub struct GetEmail;

#[async_trait]
impl Inquiry for GetEmail {
    type Output = String;

    fn method(&self) -> &'static str {
        methods::GET_EMAIL
    }

    fn build(&self) -> Option<Value> {
        None
    }

    fn declared_errors(&self) -> &'static [ErrorKind] {
        &[ErrorKind::Server, ErrorKind::Restricted]
    }

    async fn parse_return_value(
        &self,
        result: Value,
        _transport: &mut dyn Transport,
    ) -> Result<String, InquiryError> {
        field(&result, "email")
    }
}

/// Change the caller's email address.
#[derive(Clone, Debug)]
pub struct ChangeEmail {
    /// The new address.
    pub new_email: String,
}

#[async_trait]
impl Inquiry for ChangeEmail {
    type Output = ();

    fn method(&self) -> &'static str {
        methods::CHANGE_EMAIL
    }

    fn build(&self) -> Option<Value> {
        Some(json!({"newEmail": self.new_email}))
    }

    fn declared_errors(&self) -> &'static [ErrorKind] {
        &[ErrorKind::Server, ErrorKind::Restricted, ErrorKind::Syntax]
    }

    async fn parse_return_value(
        &self,
        _result: Value,
        _transport: &mut dyn Transport,
    ) -> Result<(), InquiryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_own_user_has_no_params() {
        assert!(GetOwnUser.build().is_none());
    }

    #[test]
    fn own_user_roundtrip() {
        let own = OwnUser {
            user: UserGid::new(),
            name: "ada".into(),
            email: "ada@example.org".into(),
        };
        let json = serde_json::to_value(&own).unwrap();
        let back: OwnUser = serde_json::from_value(json).unwrap();
        assert_eq!(back, own);
    }

    #[test]
    fn change_email_params_shape() {
        let inquiry = ChangeEmail {
            new_email: "new@example.org".into(),
        };
        assert_eq!(inquiry.build().unwrap()["newEmail"], "new@example.org");
    }

    #[test]
    fn change_email_declares_syntax() {
        let inquiry = ChangeEmail {
            new_email: String::new(),
        };
        assert!(inquiry.declared_errors().contains(&ErrorKind::Syntax));
    }

    #[test]
    fn profile_reads_declare_restricted_only() {
        for declared in [GetOwnUser.declared_errors(), GetEmail.declared_errors()] {
            assert!(declared.contains(&ErrorKind::Restricted));
            assert!(!declared.contains(&ErrorKind::AccessDenied));
        }
    }
}
