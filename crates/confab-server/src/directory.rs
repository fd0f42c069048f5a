//! In-memory user directory.
//!
//! The narrow domain collaborator behind the account and profile
//! handlers: names, secrets, emails, and the tokens minted for them.
//! A user may hold many live tokens (one per device); revocation is
//! per-token.

use std::collections::HashMap;

use confab_core::{
    AuthProblem, AuthToken, CreateAccountProblem, LoginProblem, UserGid, WireError,
};
use parking_lot::RwLock;

/// Minimum secret length accepted at account creation.
const MIN_SECRET_LEN: usize = 8;
/// Account name length bounds.
const NAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;

#[derive(Clone)]
struct UserRecord {
    name: String,
    secret: String,
    email: String,
}

/// What the profile handlers may see of a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserSummary {
    /// The user's identifier.
    pub user: UserGid,
    /// Display name.
    pub name: String,
    /// Current email address.
    pub email: String,
}

#[derive(Default)]
struct Inner {
    users: HashMap<UserGid, UserRecord>,
    names: HashMap<String, UserGid>,
    tokens: HashMap<String, UserGid>,
}

/// Accounts, credentials, and capability tokens.
#[derive(Default)]
pub struct Directory {
    inner: RwLock<Inner>,
}

fn name_allowed(name: &str) -> bool {
    NAME_LEN.contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Directory {
    /// An empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account, minting a first token.
    pub fn create_account(
        &self,
        name: &str,
        secret: &str,
    ) -> Result<(UserGid, AuthToken), WireError> {
        if !name_allowed(name) {
            return Err(WireError::CreateAccount(CreateAccountProblem::NameForbidden));
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(WireError::CreateAccount(CreateAccountProblem::SecretTooWeak));
        }
        let mut inner = self.inner.write();
        if inner.names.contains_key(name) {
            return Err(WireError::CreateAccount(CreateAccountProblem::NameTaken));
        }
        let user = UserGid::new();
        let token = AuthToken::mint();
        let _ = inner.users.insert(
            user,
            UserRecord {
                name: name.to_owned(),
                secret: secret.to_owned(),
                email: String::new(),
            },
        );
        let _ = inner.names.insert(name.to_owned(), user);
        let _ = inner.tokens.insert(token.expose().to_owned(), user);
        Ok((user, token))
    }

    /// Authenticate by name and secret, minting a fresh token.
    pub fn login(&self, name: &str, secret: &str) -> Result<(UserGid, AuthToken), WireError> {
        let mut inner = self.inner.write();
        let Some(&user) = inner.names.get(name) else {
            return Err(WireError::Login(LoginProblem::UnknownUser));
        };
        let stored = inner.users.get(&user).map(|r| r.secret.clone());
        if stored.as_deref() != Some(secret) {
            return Err(WireError::Login(LoginProblem::WrongSecret));
        }
        let token = AuthToken::mint();
        let _ = inner.tokens.insert(token.expose().to_owned(), user);
        Ok((user, token))
    }

    /// Resolve a presented token to its identity.
    pub fn authorize(&self, token: &AuthToken) -> Result<UserGid, WireError> {
        self.inner
            .read()
            .tokens
            .get(token.expose())
            .copied()
            .ok_or(WireError::Auth(AuthProblem::UnknownToken))
    }

    /// Revoke one token. Other tokens of the same user stay valid.
    pub fn revoke(&self, token: &AuthToken) {
        let _ = self.inner.write().tokens.remove(token.expose());
    }

    /// The user's summary, if the account exists.
    #[must_use]
    pub fn summary(&self, user: UserGid) -> Option<UserSummary> {
        self.inner.read().users.get(&user).map(|record| UserSummary {
            user,
            name: record.name.clone(),
            email: record.email.clone(),
        })
    }

    /// The user's email address.
    #[must_use]
    pub fn email(&self, user: UserGid) -> Option<String> {
        self.inner.read().users.get(&user).map(|r| r.email.clone())
    }

    /// Overwrite the user's email address.
    ///
    /// The address must look like one; anything without an `@` is a
    /// malformed request.
    pub fn set_email(&self, user: UserGid, email: &str) -> Result<(), WireError> {
        if !email.contains('@') {
            return Err(WireError::Syntax);
        }
        let mut inner = self.inner.write();
        let Some(record) = inner.users.get_mut(&user) else {
            return Err(WireError::ObjectNotFound {
                gid: Some(user.gid()),
            });
        };
        record.email = email.to_owned();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn create_login_authorize_flow() {
        let dir = Directory::new();
        let (user, token) = dir.create_account("ada", "correct horse").unwrap();
        assert_eq!(dir.authorize(&token).unwrap(), user);

        let (same_user, second_token) = dir.login("ada", "correct horse").unwrap();
        assert_eq!(same_user, user);
        assert_eq!(dir.authorize(&second_token).unwrap(), user);
    }

    #[test]
    fn duplicate_name_rejected() {
        let dir = Directory::new();
        let _ = dir.create_account("ada", "password1").unwrap();
        assert_matches!(
            dir.create_account("ada", "password2"),
            Err(WireError::CreateAccount(CreateAccountProblem::NameTaken))
        );
    }

    #[test]
    fn forbidden_names_rejected() {
        let dir = Directory::new();
        for name in ["ab", "has space", "ok!", &"x".repeat(33)] {
            assert_matches!(
                dir.create_account(name, "password1"),
                Err(WireError::CreateAccount(CreateAccountProblem::NameForbidden)),
                "name {name:?} should be forbidden"
            );
        }
    }

    #[test]
    fn weak_secret_rejected() {
        let dir = Directory::new();
        assert_matches!(
            dir.create_account("ada", "short"),
            Err(WireError::CreateAccount(CreateAccountProblem::SecretTooWeak))
        );
    }

    #[test]
    fn login_problems() {
        let dir = Directory::new();
        let _ = dir.create_account("ada", "password1").unwrap();
        assert_matches!(
            dir.login("nobody", "password1"),
            Err(WireError::Login(LoginProblem::UnknownUser))
        );
        assert_matches!(
            dir.login("ada", "wrong-secret"),
            Err(WireError::Login(LoginProblem::WrongSecret))
        );
    }

    #[test]
    fn unknown_token_rejected() {
        let dir = Directory::new();
        assert_matches!(
            dir.authorize(&AuthToken::from("nope")),
            Err(WireError::Auth(AuthProblem::UnknownToken))
        );
    }

    #[test]
    fn revoke_is_per_token() {
        let dir = Directory::new();
        let (_, first) = dir.create_account("ada", "password1").unwrap();
        let (_, second) = dir.login("ada", "password1").unwrap();

        dir.revoke(&first);
        assert_matches!(
            dir.authorize(&first),
            Err(WireError::Auth(AuthProblem::UnknownToken))
        );
        assert!(dir.authorize(&second).is_ok());
    }

    #[test]
    fn email_lifecycle() {
        let dir = Directory::new();
        let (user, _) = dir.create_account("ada", "password1").unwrap();
        assert_eq!(dir.email(user).unwrap(), "");

        dir.set_email(user, "ada@example.org").unwrap();
        assert_eq!(dir.email(user).unwrap(), "ada@example.org");
        assert_eq!(dir.summary(user).unwrap().email, "ada@example.org");
    }

    #[test]
    fn malformed_email_is_syntax() {
        let dir = Directory::new();
        let (user, _) = dir.create_account("ada", "password1").unwrap();
        assert_matches!(dir.set_email(user, "not-an-email"), Err(WireError::Syntax));
    }

    #[test]
    fn set_email_for_unknown_user() {
        let dir = Directory::new();
        let ghost = UserGid::new();
        assert_matches!(
            dir.set_email(ghost, "a@b.c"),
            Err(WireError::ObjectNotFound { gid: Some(g) }) if g == ghost.gid()
        );
    }

    #[test]
    fn summary_for_unknown_user_is_none() {
        let dir = Directory::new();
        assert!(dir.summary(UserGid::new()).is_none());
    }
}
