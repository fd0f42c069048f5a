//! Cached own-profile façade.
//!
//! The reference consumer of the cache family: the caller's email and
//! user summary are lazily populated over the dispatcher, kept fresh by
//! forced updates on successful mutation, and patched in place when
//! another session's change arrives over the event connection. A
//! successful [`Profile::change_email`] never waits for the cache to
//! expire — the confirmed value is pushed straight in.

use std::sync::Arc;

use confab_core::{Event, event};
use confab_proto::inquiries::{ChangeEmail, GetEmail, GetOwnUser, OwnUser};
use tracing::debug;

use crate::cache::{CacheCell, WatchableCacheCell};
use crate::dispatcher::{Dispatcher, InquirySource};
use crate::error::ClientError;
use crate::events::EventListener;

/// The caller's own cached profile state.
pub struct Profile {
    dispatcher: Dispatcher,
    email: WatchableCacheCell<String>,
    own_user: CacheCell<OwnUser>,
}

impl Profile {
    /// Wire a profile to a dispatcher.
    pub fn new(dispatcher: Dispatcher) -> Self {
        let email = WatchableCacheCell::new(Arc::new(InquirySource::new(
            dispatcher.clone(),
            GetEmail,
        )));
        let own_user = CacheCell::new(Arc::new(InquirySource::new(
            dispatcher.clone(),
            GetOwnUser,
        )));
        Self {
            dispatcher,
            email,
            own_user,
        }
    }

    /// The caller's email, from cache or one shared fetch.
    pub async fn email(&self) -> Result<String, ClientError> {
        self.email.get().await
    }

    /// The email cell, for observation and non-blocking access.
    #[must_use]
    pub fn email_cell(&self) -> &WatchableCacheCell<String> {
        &self.email
    }

    /// The caller's user summary, from cache or one shared fetch.
    pub async fn own_user(&self) -> Result<OwnUser, ClientError> {
        self.own_user.get().await
    }

    /// Change the email address.
    ///
    /// On success the confirmed value is forced into the cache — the
    /// next read observes it whether or not the cell previously held the
    /// old address.
    pub async fn change_email(&self, new_email: impl Into<String>) -> Result<(), ClientError> {
        let new_email = new_email.into();
        self.dispatcher
            .inquire(&ChangeEmail {
                new_email: new_email.clone(),
            })
            .await?;
        self.email.update_item(new_email);
        Ok(())
    }

    /// Register a profile's event-driven updates on a listener.
    ///
    /// The listener holds only a weak reference; dropping the profile
    /// detaches it.
    pub fn attach(profile: &Arc<Self>, listener: &EventListener) {
        let weak = Arc::downgrade(profile);
        listener.on(event::types::EMAIL_CHANGED, move |event| {
            if let Some(profile) = weak.upgrade() {
                profile.apply_event(event);
            }
        });
    }

    /// Fold a server-pushed event into the cached state.
    pub fn apply_event(&self, event: &Event) {
        if event.event_type != event::types::EMAIL_CHANGED {
            return;
        }
        let Some(email) = event
            .data
            .as_ref()
            .and_then(|data| data.get("email"))
            .and_then(|value| value.as_str())
        else {
            debug!("email_changed event without an email payload");
            return;
        };
        self.email.update_item(email.to_owned());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
