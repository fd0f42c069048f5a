//! User-keyed event fan-out.
//!
//! The roster maps each user to the set of their currently registered
//! event-sink connections. Fan-out is best-effort and fire-and-forget:
//! no queue survives the sink's bounded channel, nothing is retried, and
//! a user with zero registrations simply receives nothing. Buckets are
//! locked per user (sharded map), so fan-out to unrelated users runs
//! concurrently.

use confab_core::{Event, Gid, UserGid};
use dashmap::DashMap;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// One registered sink: the send side of its session's event queue.
pub struct SinkHandle {
    id: Gid,
    tx: mpsc::Sender<Event>,
}

impl SinkHandle {
    /// Pair an identifier with a session's event queue.
    #[must_use]
    pub fn new(id: Gid, tx: mpsc::Sender<Event>) -> Self {
        Self { id, tx }
    }

    /// The sink's identifier within its user's registration set.
    #[must_use]
    pub fn id(&self) -> Gid {
        self.id
    }
}

/// Directory from user identity to live event sinks.
#[derive(Default)]
pub struct EventRoster {
    buckets: DashMap<UserGid, Vec<SinkHandle>>,
}

impl EventRoster {
    /// An empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink under a user. Many sinks per user is the norm — one
    /// per device or session.
    pub fn register(&self, user: UserGid, sink: SinkHandle) {
        debug!(%user, sink = %sink.id, "event sink registered");
        self.buckets.entry(user).or_default().push(sink);
    }

    /// Remove one sink from a user's registration set. The user's other
    /// sinks are untouched.
    pub fn deregister(&self, user: UserGid, sink_id: Gid) {
        if let Some(mut bucket) = self.buckets.get_mut(&user) {
            bucket.retain(|sink| sink.id != sink_id);
        }
        let _ = self.buckets.remove_if(&user, |_, bucket| bucket.is_empty());
        debug!(%user, sink = %sink_id, "event sink deregistered");
    }

    /// Number of live registrations for a user.
    #[must_use]
    pub fn registration_count(&self, user: UserGid) -> usize {
        self.buckets.get(&user).map_or(0, |bucket| bucket.len())
    }

    /// Deliver `event` to every registered sink of every target user.
    ///
    /// Returns the number of sinks the event was handed to. Sinks whose
    /// session is gone are pruned on the way; sinks with a full queue
    /// keep their registration but drop this event.
    pub fn fire(&self, event: &Event, targets: &[UserGid]) -> usize {
        self.fire_internal(event, None, targets)
    }

    /// Like [`EventRoster::fire`], but skips every sink of the
    /// originating user.
    pub fn fire_excluding(&self, event: &Event, origin: UserGid, targets: &[UserGid]) -> usize {
        self.fire_internal(event, Some(origin), targets)
    }

    fn fire_internal(
        &self,
        event: &Event,
        exclude: Option<UserGid>,
        targets: &[UserGid],
    ) -> usize {
        let mut delivered = 0usize;
        for &user in targets {
            if exclude == Some(user) {
                continue;
            }
            let Some(mut bucket) = self.buckets.get_mut(&user) else {
                continue;
            };
            bucket.retain(|sink| match sink.tx.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    counter!("events_dropped_total").increment(1);
                    warn!(%user, sink = %sink.id, event_type = %event.event_type, "sink queue full, event dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%user, sink = %sink.id, "pruning dead sink");
                    false
                }
            });
            let is_empty = bucket.is_empty();
            drop(bucket);
            if is_empty {
                let _ = self.buckets.remove_if(&user, |_, bucket| bucket.is_empty());
            }
        }
        counter!("events_delivered_total").increment(delivered as u64);
        delivered
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(capacity: usize) -> (SinkHandle, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (SinkHandle::new(Gid::new(), tx), rx)
    }

    #[test]
    fn delivers_to_every_connection_of_target_users() {
        let roster = EventRoster::new();
        let u1 = UserGid::new();
        let u2 = UserGid::new();

        // U1 has two sessions; U2 has none.
        let (s1, mut r1) = sink(8);
        let (s2, mut r2) = sink(8);
        roster.register(u1, s1);
        roster.register(u1, s2);

        let delivered = roster.fire(&Event::new("user.notification"), &[u1, u2]);
        assert_eq!(delivered, 2);
        assert!(r1.try_recv().is_ok());
        assert!(r2.try_recv().is_ok());
    }

    #[test]
    fn excluded_user_receives_nothing() {
        let roster = EventRoster::new();
        let u1 = UserGid::new();
        let u3 = UserGid::new();

        let (s1, mut r1) = sink(8);
        let (s3, mut r3) = sink(8);
        roster.register(u1, s1);
        roster.register(u3, s3);

        let delivered =
            roster.fire_excluding(&Event::new("thread.message_posted"), u1, &[u1, u3]);
        assert_eq!(delivered, 1);
        assert!(r1.try_recv().is_err());
        assert!(r3.try_recv().is_ok());
    }

    #[test]
    fn user_without_registrations_is_skipped() {
        let roster = EventRoster::new();
        let nobody = UserGid::new();
        let delivered = roster.fire(&Event::new("user.notification"), &[nobody]);
        assert_eq!(delivered, 0);
    }

    #[test]
    fn non_target_user_receives_nothing() {
        let roster = EventRoster::new();
        let target = UserGid::new();
        let bystander = UserGid::new();

        let (st, mut rt) = sink(8);
        let (sb, mut rb) = sink(8);
        roster.register(target, st);
        roster.register(bystander, sb);

        let delivered = roster.fire(&Event::new("user.notification"), &[target]);
        assert_eq!(delivered, 1);
        assert!(rt.try_recv().is_ok());
        assert!(rb.try_recv().is_err());
    }

    #[test]
    fn deregister_leaves_other_sessions() {
        let roster = EventRoster::new();
        let user = UserGid::new();
        let (s1, mut r1) = sink(8);
        let (s2, mut r2) = sink(8);
        let first_id = s1.id();
        roster.register(user, s1);
        roster.register(user, s2);

        roster.deregister(user, first_id);
        assert_eq!(roster.registration_count(user), 1);

        let delivered = roster.fire(&Event::new("user.notification"), &[user]);
        assert_eq!(delivered, 1);
        assert!(r1.try_recv().is_err());
        assert!(r2.try_recv().is_ok());
    }

    #[test]
    fn dead_sink_is_pruned_on_fire() {
        let roster = EventRoster::new();
        let user = UserGid::new();
        let (s1, r1) = sink(8);
        roster.register(user, s1);
        drop(r1); // session gone

        let delivered = roster.fire(&Event::new("user.notification"), &[user]);
        assert_eq!(delivered, 0);
        assert_eq!(roster.registration_count(user), 0);
    }

    #[test]
    fn full_queue_drops_event_but_keeps_sink() {
        let roster = EventRoster::new();
        let user = UserGid::new();
        let (s1, mut r1) = sink(1);
        roster.register(user, s1);

        assert_eq!(roster.fire(&Event::new("a"), &[user]), 1);
        // Queue is full now; the second event is dropped fire-and-forget.
        assert_eq!(roster.fire(&Event::new("b"), &[user]), 0);
        assert_eq!(roster.registration_count(user), 1);

        // Draining frees the queue again.
        assert_eq!(r1.try_recv().unwrap().event_type, "a");
        assert_eq!(roster.fire(&Event::new("c"), &[user]), 1);
    }

    #[test]
    fn fire_to_empty_target_list_is_noop() {
        let roster = EventRoster::new();
        assert_eq!(roster.fire(&Event::new("x"), &[]), 0);
    }
}
