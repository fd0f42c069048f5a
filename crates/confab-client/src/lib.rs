//! # confab-client
//!
//! Client-side machinery for the confab protocol:
//!
//! - [`link`]: the connection lifecycle manager — one live transport
//!   handle, resurrected with backoff when it dies
//! - [`backoff`]: the reconnect delay policy
//! - [`dispatcher`]: the three-shaped request surface (async, callback,
//!   cancellable future)
//! - [`cache`]: the single-flight cache family that keeps lazily
//!   populated state consistent with a connection that can die
//! - [`events`]: the event-connection listener
//! - [`profile`]: the cached own-profile façade

#![deny(unsafe_code)]

pub mod backoff;
pub mod cache;
pub mod connection;
pub mod connector;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod link;
pub mod profile;

pub use backoff::{BackoffPolicy, DoublingBackoff};
pub use cache::{CacheCell, CacheFuture, Populate, WatchableCacheCell};
pub use connection::{Connection, Role};
pub use connector::Connector;
pub use dispatcher::{DispatchFuture, Dispatcher, InquirySource};
pub use error::ClientError;
pub use events::EventListener;
pub use link::{Acquire, Link};
pub use profile::Profile;

#[cfg(test)]
pub(crate) mod testutil;
