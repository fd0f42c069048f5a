//! The concrete operation set.
//!
//! Each inquiry is a thin template: parameter encoding on the way out,
//! typed decoding on the way back, and the declared-error set the server
//! counterpart is allowed to produce. The wider business surface lives
//! behind the same contract; these are the operations the network core
//! itself needs.

pub mod auth;
pub mod media;
pub mod user;

pub use auth::{Authorize, CreateAccount, Credentials, Login};
pub use media::{DownloadMedia, UploadMedia};
pub use user::{ChangeEmail, GetEmail, GetOwnUser, OwnUser};

/// Wire method names, shared with the server-side registry.
pub mod methods {
    /// Re-authorize a fresh connection with a stored token.
    pub const AUTHORIZE: &str = "session.authorize";
    /// Authenticate with name + secret, minting a token.
    pub const LOGIN: &str = "account.login";
    /// Create an account, minting a token.
    pub const CREATE_ACCOUNT: &str = "account.create";
    /// Fetch the caller's own user summary.
    pub const GET_OWN_USER: &str = "user.get_own";
    /// Fetch the caller's email address.
    pub const GET_EMAIL: &str = "user.get_email";
    /// Change the caller's email address.
    pub const CHANGE_EMAIL: &str = "user.change_email";
    /// Upload a media blob (auxiliary payload follows the request).
    pub const UPLOAD_MEDIA: &str = "media.upload";
    /// Download a media blob (raw payload follows the response).
    pub const DOWNLOAD_MEDIA: &str = "media.download";
}
