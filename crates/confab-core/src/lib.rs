//! # confab-core
//!
//! Foundation types shared by every confab crate:
//!
//! - **Branded GIDs**: `UserGid`, `ThreadGid`, `MediaGid`, … as newtypes
//!   over a time-ordered [`Gid`]
//! - **Auth tokens**: [`AuthToken`] opaque capability values
//! - **Errors**: the closed [`WireError`] taxonomy with problem sub-codes
//!   and [`ErrorKind`] discriminants for declared-error sets
//! - **Events**: the server-pushed [`Event`] structure

#![deny(unsafe_code)]

pub mod error;
pub mod event;
pub mod ids;
pub mod token;

pub use error::{
    AuthProblem, CreateAccountProblem, ErrorKind, LoginProblem, WireError,
};
pub use event::Event;
pub use ids::{
    CommunityGid, Gid, MediaGid, MessageGid, NotificationGid, ThreadGid, UserGid,
};
pub use token::AuthToken;
