//! The notifier: fans committed events out to participants, projecting each
//! one per recipient so nobody receives more than their role entitles them
//! to.
//!
//! The subscriber table is cache-grade state (a restart loses subscriptions,
//! clients re-attach and re-fetch); the event log in the store stays
//! authoritative. Delivery is best-effort and ordered per recipient: each
//! connection drains one bounded queue in publish order.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::metrics::EngineMetrics;
use crate::protocol::{
    ActionKind, EventPush, Role, ServerMessage, UserId, Visibility,
};
use crate::store::{EventRecord, PlayerRecord, SessionSnapshot};

/// Push fan-out with per-recipient visibility projection.
pub struct Notifier {
    subscribers: DashMap<UserId, mpsc::Sender<Arc<ServerMessage>>>,
    metrics: Arc<EngineMetrics>,
}

impl Notifier {
    pub fn new(metrics: Arc<EngineMetrics>) -> Self {
        Self {
            subscribers: DashMap::new(),
            metrics,
        }
    }

    /// Attach a connection for a principal. The latest connection wins; an
    /// older one is dropped and its socket closes when its queue does.
    pub fn subscribe(&self, user_id: UserId, sender: mpsc::Sender<Arc<ServerMessage>>) {
        if self.subscribers.insert(user_id, sender).is_none() {
            self.metrics
                .active_subscriptions
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn unsubscribe(&self, user_id: &UserId) {
        if self.subscribers.remove(user_id).is_some() {
            self.metrics
                .active_subscriptions
                .fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Detach only if `sender` is still the registered connection. A stale
    /// socket tearing down after the client already re-attached must not take
    /// the fresh subscription with it. Returns whether a removal happened.
    pub fn unsubscribe_if_same(
        &self,
        user_id: &UserId,
        sender: &mpsc::Sender<Arc<ServerMessage>>,
    ) -> bool {
        let removed = self
            .subscribers
            .remove_if(user_id, |_, current| current.same_channel(sender))
            .is_some();
        if removed {
            self.metrics
                .active_subscriptions
                .fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn is_subscribed(&self, user_id: &UserId) -> bool {
        self.subscribers.contains_key(user_id)
    }

    /// Fan a batch of committed events out to the session's participants.
    /// Only call after the owning transaction committed: an event for a
    /// rolled-back mutation must never reach a client.
    pub fn publish(&self, snapshot: &SessionSnapshot, events: &[EventRecord]) {
        for event in events {
            self.metrics.events_published.fetch_add(1, Ordering::Relaxed);
            for player in &snapshot.players {
                let Some(data) = project_event(event, player) else {
                    continue;
                };
                let Some(sender) = self
                    .subscribers
                    .get(&player.user_id)
                    .map(|entry| entry.value().clone())
                else {
                    continue;
                };
                let message = Arc::new(ServerMessage::Event(Box::new(EventPush {
                    kind: event.kind,
                    session_id: event.session_id,
                    phase_number: event.phase_number,
                    data,
                })));
                if sender.try_send(message).is_err() {
                    self.metrics.pushes_dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        user_id = %player.user_id,
                        session_id = %event.session_id,
                        "Push queue full or closed, dropping event"
                    );
                } else {
                    self.metrics.pushes_sent.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Drop every subscription (process shutdown).
    pub fn shutdown(&self) {
        self.subscribers.clear();
        self.metrics.active_subscriptions.store(0, Ordering::Relaxed);
    }
}

/// Project one event for one recipient. `None` means the recipient gets
/// nothing, the common case for night traffic.
pub(crate) fn project_event(
    event: &EventRecord,
    recipient: &PlayerRecord,
) -> Option<serde_json::Value> {
    match &event.visibility {
        Visibility::Public => Some(event.data.clone()),
        Visibility::Nobody => None,
        Visibility::Players { player_ids } => player_ids
            .contains(&recipient.id)
            .then(|| event.data.clone()),
        Visibility::Roles { roles } => {
            // Role-scoped events go to alive holders only; the dead have no
            // night business.
            if !recipient.is_alive || !roles.contains(&recipient.role) {
                return None;
            }
            if is_werewolf_tally(event) && recipient.role == Role::Witch {
                // The witch sees only the provisional victim, never the
                // pack's individual votes.
                return Some(serde_json::json!({
                    "kind": ActionKind::WerewolfVote,
                    "provisional_victim": event.data.get("provisional_victim")
                        .cloned()
                        .unwrap_or(serde_json::Value::Null),
                }));
            }
            Some(event.data.clone())
        }
    }
}

fn is_werewolf_tally(event: &EventRecord) -> bool {
    event
        .data
        .get("kind")
        .and_then(|kind| serde_json::from_value::<ActionKind>(kind.clone()).ok())
        == Some(ActionKind::WerewolfVote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::snapshot_with_roles;
    use crate::protocol::{EventKind, SessionId};
    use chrono::Utc;
    use uuid::Uuid;

    fn event(session_id: SessionId, visibility: Visibility, data: serde_json::Value) -> EventRecord {
        EventRecord {
            id: Uuid::new_v4(),
            session_id,
            phase_number: 1,
            kind: EventKind::ActionTaken,
            public: visibility.is_public(),
            visibility,
            data,
            created_at: Utc::now(),
        }
    }

    fn tally_event(snapshot: &SessionSnapshot) -> EventRecord {
        event(
            snapshot.session.id,
            Visibility::roles([Role::Werewolf, Role::Witch]),
            serde_json::json!({
                "kind": "werewolf_vote",
                "tally": [{"voter_id": snapshot.players[0].id, "target_id": snapshot.players[2].id}],
                "provisional_victim": snapshot.players[2].id,
            }),
        )
    }

    #[test]
    fn test_public_event_reaches_everyone() {
        let snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Witch, Role::Villager]);
        let record = event(
            snapshot.session.id,
            Visibility::Public,
            serde_json::json!({"phase": "night"}),
        );
        for player in &snapshot.players {
            assert!(project_event(&record, player).is_some());
        }
    }

    #[test]
    fn test_stored_only_event_reaches_nobody() {
        let snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Witch, Role::Villager]);
        let record = event(
            snapshot.session.id,
            Visibility::Nobody,
            serde_json::json!({"kind": "bodyguard_protect"}),
        );
        for player in &snapshot.players {
            assert!(project_event(&record, player).is_none());
        }
    }

    #[test]
    fn test_werewolf_sees_tally_witch_sees_only_victim() {
        let snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Witch, Role::Villager]);
        let record = tally_event(&snapshot);

        let wolf_view = project_event(&record, &snapshot.players[0]).unwrap();
        assert!(wolf_view.get("tally").is_some());

        let witch_view = project_event(&record, &snapshot.players[1]).unwrap();
        assert!(witch_view.get("tally").is_none());
        assert_eq!(
            witch_view["provisional_victim"],
            serde_json::json!(snapshot.players[2].id)
        );

        assert!(project_event(&record, &snapshot.players[2]).is_none());
    }

    #[test]
    fn test_dead_werewolf_gets_no_tally() {
        let mut snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Werewolf, Role::Villager]);
        let dead = snapshot.players[1].id;
        snapshot.player_mut(&dead).unwrap().is_alive = false;
        let record = tally_event(&snapshot);

        assert!(project_event(&record, snapshot.player(&dead).unwrap()).is_none());
    }

    #[test]
    fn test_player_scoped_event() {
        let snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Seer, Role::Villager]);
        let seer = &snapshot.players[1];
        let record = event(
            snapshot.session.id,
            Visibility::players([seer.id]),
            serde_json::json!({"result": "werewolf"}),
        );

        assert!(project_event(&record, seer).is_some());
        assert!(project_event(&record, &snapshot.players[0]).is_none());
        assert!(project_event(&record, &snapshot.players[2]).is_none());
    }

    #[tokio::test]
    async fn test_publish_delivers_in_order() {
        let metrics = Arc::new(EngineMetrics::new());
        let notifier = Notifier::new(metrics);
        let snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Villager, Role::Villager]);

        let (tx, mut rx) = mpsc::channel(16);
        notifier.subscribe(snapshot.players[1].user_id, tx);

        let events: Vec<EventRecord> = (0..3)
            .map(|i| {
                event(
                    snapshot.session.id,
                    Visibility::Public,
                    serde_json::json!({"seq": i}),
                )
            })
            .collect();
        notifier.publish(&snapshot, &events);

        for expected in 0..3 {
            let message = rx.recv().await.unwrap();
            let ServerMessage::Event(push) = message.as_ref() else {
                panic!("expected event push");
            };
            assert_eq!(push.data["seq"], expected);
        }
    }

    #[tokio::test]
    async fn test_stale_detach_keeps_fresh_subscription() {
        let metrics = Arc::new(EngineMetrics::new());
        let notifier = Notifier::new(metrics);
        let snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Villager, Role::Villager]);
        let user = snapshot.players[1].user_id;

        let (old_tx, _old_rx) = mpsc::channel(4);
        notifier.subscribe(user, old_tx.clone());
        let (new_tx, mut new_rx) = mpsc::channel(4);
        notifier.subscribe(user, new_tx.clone());

        // The old socket's teardown arrives late: it must not detach the new
        // connection.
        assert!(!notifier.unsubscribe_if_same(&user, &old_tx));
        notifier.publish(
            &snapshot,
            &[event(
                snapshot.session.id,
                Visibility::Public,
                serde_json::json!({}),
            )],
        );
        assert!(new_rx.try_recv().is_ok());

        assert!(notifier.unsubscribe_if_same(&user, &new_tx));
        assert!(!notifier.is_subscribed(&user));
    }

    #[tokio::test]
    async fn test_unsubscribed_user_receives_nothing() {
        let metrics = Arc::new(EngineMetrics::new());
        let notifier = Notifier::new(metrics.clone());
        let snapshot = snapshot_with_roles(&[Role::Werewolf, Role::Villager, Role::Villager]);

        let (tx, mut rx) = mpsc::channel(16);
        let user = snapshot.players[0].user_id;
        notifier.subscribe(user, tx);
        notifier.unsubscribe(&user);

        notifier.publish(
            &snapshot,
            &[event(
                snapshot.session.id,
                Visibility::Public,
                serde_json::json!({}),
            )],
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.active_subscriptions.load(Ordering::Relaxed), 0);
    }
}
