//! Branded GID newtypes for type safety.
//!
//! Every addressable entity in confab is keyed by a [`Gid`]: a globally
//! unique, totally-ordered identifier (UUID v7, time-ordered). The order
//! is meaningful — pagination queries say "messages before GID X" — so
//! `Gid` implements `Ord`.
//!
//! Entity-specific wrappers (`UserGid`, `ThreadGid`, …) prevent passing a
//! thread's identifier where a user's is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Globally unique, totally-ordered identifier.
///
/// Immutable once created; comparison order follows creation time
/// (UUID v7), which pagination relies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(Uuid);

impl Gid {
    /// Mint a fresh identifier (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for Gid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Gid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

macro_rules! entity_gid {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Gid);

        impl $name {
            /// Mint a fresh identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Gid::new())
            }

            /// The untyped identifier.
            #[must_use]
            pub fn gid(&self) -> Gid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Gid> for $name {
            fn from(gid: Gid) -> Self {
                Self(gid)
            }
        }

        impl From<$name> for Gid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

entity_gid! {
    /// Identifier of a user account.
    UserGid
}

entity_gid! {
    /// Identifier of a community.
    CommunityGid
}

entity_gid! {
    /// Identifier of a discussion thread.
    ThreadGid
}

entity_gid! {
    /// Identifier of a single message.
    MessageGid
}

entity_gid! {
    /// Identifier of a notification.
    NotificationGid
}

entity_gid! {
    /// Identifier of an uploaded media blob.
    MediaGid
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gid_is_uuid_v7() {
        let gid = Gid::new();
        assert_eq!(gid.as_uuid().get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn gids_are_unique() {
        let a = Gid::new();
        let b = Gid::new();
        assert_ne!(a, b);
    }

    #[test]
    fn creation_order_is_comparison_order() {
        // v7 embeds a millisecond timestamp; force distinct ticks.
        let a = Gid::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = Gid::new();
        assert!(a < b, "later GID must order after earlier GID");
    }

    #[test]
    fn display_and_parse_roundtrip() {
        let gid = Gid::new();
        let parsed: Gid = gid.to_string().parse().unwrap();
        assert_eq!(parsed, gid);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("not-a-gid".parse::<Gid>().is_err());
    }

    #[test]
    fn serde_is_transparent() {
        let gid = Gid::new();
        let json = serde_json::to_string(&gid).unwrap();
        assert_eq!(json, format!("\"{gid}\""));
        let back: Gid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, gid);
    }

    #[test]
    fn branded_ids_are_distinct_types() {
        // Compile-time property; here we just exercise the conversions.
        let user = UserGid::new();
        let raw: Gid = user.into();
        let back = UserGid::from(raw);
        assert_eq!(back, user);
    }

    #[test]
    fn branded_id_display_matches_inner() {
        let thread = ThreadGid::new();
        assert_eq!(thread.to_string(), thread.gid().to_string());
    }

    #[test]
    fn branded_id_parse() {
        let media = MediaGid::new();
        let parsed: MediaGid = media.to_string().parse().unwrap();
        assert_eq!(parsed, media);
    }

    #[test]
    fn branded_id_ordering_follows_creation() {
        let a = MessageGid::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = MessageGid::new();
        assert!(a < b);
    }

    #[test]
    fn serde_in_struct() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Row {
            user: UserGid,
            thread: ThreadGid,
        }

        let row = Row {
            user: UserGid::new(),
            thread: ThreadGid::new(),
        };
        let json = serde_json::to_string(&row).unwrap();
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}
