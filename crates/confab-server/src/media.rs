//! In-memory media blob store.

use std::collections::HashMap;

use bytes::Bytes;
use confab_core::MediaGid;
use parking_lot::RwLock;

/// Uploaded blobs keyed by their minted identifier.
#[derive(Default)]
pub struct MediaStore {
    blobs: RwLock<HashMap<MediaGid, Bytes>>,
}

impl MediaStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a blob, minting its identifier.
    pub fn store(&self, bytes: Bytes) -> MediaGid {
        let media = MediaGid::new();
        let _ = self.blobs.write().insert(media, bytes);
        media
    }

    /// Fetch a blob.
    #[must_use]
    pub fn fetch(&self, media: MediaGid) -> Option<Bytes> {
        self.blobs.read().get(&media).cloned()
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}
