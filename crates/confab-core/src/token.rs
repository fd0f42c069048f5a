//! Opaque authentication capability tokens.

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of freshly minted tokens.
const TOKEN_LEN: usize = 48;

/// An opaque capability proving a previously-authenticated identity.
///
/// Minted by the server at login or account creation and presented on a
/// fresh connection to re-authorize it without re-sending credentials.
/// The client never interprets the contents. `Debug` output is redacted
/// so tokens do not leak into logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Mint a fresh random token (server side).
    #[must_use]
    pub fn mint() -> Self {
        let value: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        Self(value)
    }

    /// Wrap an existing token value (e.g. read back from keychain).
    #[must_use]
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// The raw token value, for wire encoding only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(..)")
    }
}

impl From<String> for AuthToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AuthToken {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_tokens_are_unique() {
        let a = AuthToken::mint();
        let b = AuthToken::mint();
        assert_ne!(a, b);
    }

    #[test]
    fn minted_token_length() {
        let token = AuthToken::mint();
        assert_eq!(token.expose().len(), TOKEN_LEN);
    }

    #[test]
    fn debug_is_redacted() {
        let token = AuthToken::from("super-secret-value");
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret-value"));
        assert_eq!(debug, "AuthToken(..)");
    }

    #[test]
    fn serde_is_transparent() {
        let token = AuthToken::from("abc123");
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"abc123\"");
        let back: AuthToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn from_string_preserves_value() {
        let token = AuthToken::from_string("stored".into());
        assert_eq!(token.expose(), "stored");
    }
}
