//! Shared server state handed to every handler.

use std::sync::Arc;

use crate::directory::Directory;
use crate::fanout::EventRoster;
use crate::media::MediaStore;

/// The collaborators behind the request surface.
#[derive(Clone)]
pub struct ServerContext {
    /// User accounts, secrets, tokens, emails.
    pub directory: Arc<Directory>,
    /// Uploaded media blobs.
    pub media: Arc<MediaStore>,
    /// Registered event sinks per user.
    pub roster: Arc<EventRoster>,
}

impl ServerContext {
    /// Wire up a context from its parts.
    pub fn new(directory: Arc<Directory>, media: Arc<MediaStore>, roster: Arc<EventRoster>) -> Self {
        Self {
            directory,
            media,
            roster,
        }
    }

    /// A context with fresh, empty state.
    #[must_use]
    pub fn fresh() -> Self {
        Self::new(
            Arc::new(Directory::new()),
            Arc::new(MediaStore::new()),
            Arc::new(EventRoster::new()),
        )
    }
}
