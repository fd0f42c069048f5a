//! # confab-server
//!
//! The confab server core:
//!
//! - [`session`]: per-connection task — authorization state machine,
//!   request dispatch, event-sink switchover
//! - [`registry`]: method handlers with auxiliary-payload drain contracts
//! - [`fanout`]: user-keyed best-effort event delivery
//! - [`directory`] / [`media`]: the in-memory domain collaborators the
//!   handlers delegate to
//! - [`server`]: TCP accept loop and connection cap
//! - [`shutdown`]: graceful teardown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod directory;
pub mod fanout;
pub mod handlers;
pub mod media;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::ServerConfig;
pub use context::ServerContext;
pub use directory::Directory;
pub use fanout::{EventRoster, SinkHandle};
pub use media::MediaStore;
pub use registry::{Call, MethodHandler, MethodRegistry, Reply};
pub use server::Server;
pub use shutdown::ShutdownCoordinator;
