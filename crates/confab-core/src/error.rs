//! The closed wire-error taxonomy.
//!
//! Every remote operation declares the subset of [`ErrorKind`]s it may
//! legitimately produce. A structurally valid error of an *undeclared*
//! kind is a protocol violation (client/server version skew), not a
//! domain error — that check lives in the protocol framework, which uses
//! [`WireError::kind`] to compare against an operation's declared set.
//!
//! Variants carry either an enumerated problem sub-code or the offending
//! identifier, mirroring what the server knows about the failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::ids::Gid;

// ─────────────────────────────────────────────────────────────────────────────
// ErrorKind — fieldless discriminants for declared-error sets
// ─────────────────────────────────────────────────────────────────────────────

/// Discriminant of a [`WireError`], used in declared-error sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Unexpected server-side fault.
    Server,
    /// The connection's authorization state forbids the operation.
    Restricted,
    /// Caller exceeded a rate limit.
    RateLimit,
    /// Malformed request (typically a version-skew symptom).
    Syntax,
    /// A referenced identifier is unknown.
    ObjectNotFound,
    /// Authorization insufficient for this specific target.
    AccessDenied,
    /// Login failed.
    Login,
    /// Token authorization failed.
    Auth,
    /// Account creation failed.
    CreateAccount,
    /// Referenced media blob unknown.
    MediaNotFound,
    /// Two-factor confirmation required to proceed.
    TfaRequired,
}

impl ErrorKind {
    /// Stable wire code for this kind.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Server => "SERVER_ERROR",
            Self::Restricted => "RESTRICTED",
            Self::RateLimit => "RATE_LIMIT",
            Self::Syntax => "SYNTAX",
            Self::ObjectNotFound => "OBJECT_NOT_FOUND",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::Login => "LOGIN_FAILED",
            Self::Auth => "AUTH_FAILED",
            Self::CreateAccount => "CREATE_ACCOUNT_FAILED",
            Self::MediaNotFound => "MEDIA_NOT_FOUND",
            Self::TfaRequired => "TFA_REQUIRED",
        }
    }

    /// Parse a wire code back into a kind.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "SERVER_ERROR" => Self::Server,
            "RESTRICTED" => Self::Restricted,
            "RATE_LIMIT" => Self::RateLimit,
            "SYNTAX" => Self::Syntax,
            "OBJECT_NOT_FOUND" => Self::ObjectNotFound,
            "ACCESS_DENIED" => Self::AccessDenied,
            "LOGIN_FAILED" => Self::Login,
            "AUTH_FAILED" => Self::Auth,
            "CREATE_ACCOUNT_FAILED" => Self::CreateAccount,
            "MEDIA_NOT_FOUND" => Self::MediaNotFound,
            "TFA_REQUIRED" => Self::TfaRequired,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Problem sub-codes
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! problem_enum {
    (
        $(#[$meta:meta])* $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $code:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// Stable wire code for this problem.
            #[must_use]
            pub fn code(self) -> &'static str {
                match self {
                    $(Self::$variant => $code,)+
                }
            }

            /// Parse a wire code back into a problem.
            #[must_use]
            pub fn from_code(code: &str) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.code())
            }
        }
    };
}

problem_enum! {
    /// Why a login was rejected.
    LoginProblem {
        /// No account with the given name.
        UnknownUser => "UNKNOWN_USER",
        /// Secret did not match.
        WrongSecret => "WRONG_SECRET",
        /// Account exists but is suspended.
        Suspended => "SUSPENDED",
    }
}

problem_enum! {
    /// Why token authorization was rejected.
    AuthProblem {
        /// Token not known to the server.
        UnknownToken => "UNKNOWN_TOKEN",
        /// Token was explicitly revoked.
        Revoked => "REVOKED",
        /// Token aged out.
        Expired => "EXPIRED",
    }
}

problem_enum! {
    /// Why account creation was rejected.
    CreateAccountProblem {
        /// Name already registered.
        NameTaken => "NAME_TAKEN",
        /// Name fails the allowed-name rules.
        NameForbidden => "NAME_FORBIDDEN",
        /// Secret fails the strength rules.
        SecretTooWeak => "SECRET_TOO_WEAK",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WireError — the closed taxonomy
// ─────────────────────────────────────────────────────────────────────────────

/// A typed error value from the closed wire taxonomy.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WireError {
    /// Unexpected server-side fault.
    #[error("unexpected server-side fault")]
    Server,

    /// The connection's authorization state forbids the operation.
    #[error("operation not permitted in this connection state")]
    Restricted,

    /// Caller exceeded a rate limit.
    #[error("rate limit exceeded")]
    RateLimit,

    /// Malformed request.
    #[error("malformed request")]
    Syntax,

    /// A referenced identifier is unknown.
    #[error("referenced object not found")]
    ObjectNotFound {
        /// The identifier the server did not recognize, when known.
        gid: Option<Gid>,
    },

    /// Authorization insufficient for this specific target.
    #[error("access denied")]
    AccessDenied {
        /// The target the caller may not touch, when known.
        gid: Option<Gid>,
    },

    /// Login failed.
    #[error("login failed: {0}")]
    Login(LoginProblem),

    /// Token authorization failed.
    #[error("authorization failed: {0}")]
    Auth(AuthProblem),

    /// Account creation failed.
    #[error("account creation failed: {0}")]
    CreateAccount(CreateAccountProblem),

    /// Referenced media blob unknown.
    #[error("media not found")]
    MediaNotFound {
        /// The media identifier, when known.
        gid: Option<Gid>,
    },

    /// Two-factor confirmation required to proceed.
    #[error("two-factor confirmation required")]
    TfaRequired,
}

impl WireError {
    /// The discriminant used against declared-error sets.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Server => ErrorKind::Server,
            Self::Restricted => ErrorKind::Restricted,
            Self::RateLimit => ErrorKind::RateLimit,
            Self::Syntax => ErrorKind::Syntax,
            Self::ObjectNotFound { .. } => ErrorKind::ObjectNotFound,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::Login(_) => ErrorKind::Login,
            Self::Auth(_) => ErrorKind::Auth,
            Self::CreateAccount(_) => ErrorKind::CreateAccount,
            Self::MediaNotFound { .. } => ErrorKind::MediaNotFound,
            Self::TfaRequired => ErrorKind::TfaRequired,
        }
    }

    /// Stable wire code (the kind's code).
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Enumerated problem sub-code, when this kind carries one.
    #[must_use]
    pub fn problem_code(&self) -> Option<&'static str> {
        match self {
            Self::Login(p) => Some(p.code()),
            Self::Auth(p) => Some(p.code()),
            Self::CreateAccount(p) => Some(p.code()),
            _ => None,
        }
    }

    /// The offending identifier, when this kind references one.
    #[must_use]
    pub fn offending(&self) -> Option<Gid> {
        match self {
            Self::ObjectNotFound { gid }
            | Self::AccessDenied { gid }
            | Self::MediaNotFound { gid } => *gid,
            _ => None,
        }
    }

    /// Reconstruct a typed error from decoded wire parts.
    ///
    /// Returns `None` when the parts do not form a legal member of the
    /// taxonomy (missing or unknown problem code for a kind that
    /// requires one) — the caller treats that as a protocol violation.
    #[must_use]
    pub fn from_wire(kind: ErrorKind, problem: Option<&str>, offending: Option<Gid>) -> Option<Self> {
        Some(match kind {
            ErrorKind::Server => Self::Server,
            ErrorKind::Restricted => Self::Restricted,
            ErrorKind::RateLimit => Self::RateLimit,
            ErrorKind::Syntax => Self::Syntax,
            ErrorKind::ObjectNotFound => Self::ObjectNotFound { gid: offending },
            ErrorKind::AccessDenied => Self::AccessDenied { gid: offending },
            ErrorKind::Login => Self::Login(LoginProblem::from_code(problem?)?),
            ErrorKind::Auth => Self::Auth(AuthProblem::from_code(problem?)?),
            ErrorKind::CreateAccount => {
                Self::CreateAccount(CreateAccountProblem::from_code(problem?)?)
            }
            ErrorKind::MediaNotFound => Self::MediaNotFound { gid: offending },
            ErrorKind::TfaRequired => Self::TfaRequired,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
