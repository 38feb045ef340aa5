//! Connected sessions and the rooms they watch.
//!
//! Every session owns a bounded outbound queue. A room is the set of
//! sessions tracking one courier. Publishing snapshots the room's membership
//! under its shard lock and then enqueues without blocking: a full or closed
//! queue drops the event for that session only.
//!
//! Lock discipline: no method holds a guard on more than one map at a time.

use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::courier::CourierId;
use crate::models::events::ServerEvent;
use crate::observability::metrics::Metrics;

pub type SessionId = Uuid;

/// Receiving half handed to the transport when a session connects.
pub struct SessionHandle {
    pub id: SessionId,
    pub events: mpsc::Receiver<ServerEvent>,
}

pub struct SessionRegistry {
    sessions: DashMap<SessionId, mpsc::Sender<ServerEvent>>,
    rooms: DashMap<CourierId, HashSet<SessionId>>,
    memberships: DashMap<SessionId, HashSet<CourierId>>,
    buffer_size: usize,
    metrics: Metrics,
}

impl SessionRegistry {
    pub fn new(buffer_size: usize, metrics: Metrics) -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            buffer_size: buffer_size.max(1),
            metrics,
        }
    }

    pub fn connect(&self) -> SessionHandle {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let id = Uuid::new_v4();

        self.sessions.insert(id, tx);
        self.metrics.connected_sessions.inc();
        debug!(session_id = %id, "session registered");

        SessionHandle { id, events: rx }
    }

    /// Removes the session and its room memberships. Safe to call more than
    /// once and concurrently with publishes.
    pub fn disconnect(&self, session_id: SessionId) {
        if self.sessions.remove(&session_id).is_some() {
            self.metrics.connected_sessions.dec();
        }
        let left = self.leave_all(session_id);
        debug!(session_id = %session_id, rooms_left = left, "session removed");
    }

    pub fn is_connected(&self, session_id: SessionId) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Adds the session to the courier's room. Joining twice is the same as
    /// joining once. Returns `false` if the session is not connected.
    pub fn join(&self, session_id: SessionId, courier_id: &str) -> bool {
        if !self.is_connected(session_id) {
            return false;
        }

        self.rooms
            .entry(courier_id.to_string())
            .or_default()
            .insert(session_id);
        self.memberships
            .entry(session_id)
            .or_default()
            .insert(courier_id.to_string());

        // A disconnect may have swept memberships between the check and the insert.
        if !self.is_connected(session_id) {
            self.leave(session_id, courier_id);
            return false;
        }

        true
    }

    /// Removes the session from one room. Returns whether it was a member.
    pub fn leave(&self, session_id: SessionId, courier_id: &str) -> bool {
        let removed = self.remove_from_room(session_id, courier_id);

        if let Some(mut joined) = self.memberships.get_mut(&session_id) {
            joined.remove(courier_id);
        }
        self.memberships
            .remove_if(&session_id, |_, joined| joined.is_empty());

        removed
    }

    /// Removes the session from every room it joined. Returns the number of
    /// rooms left.
    pub fn leave_all(&self, session_id: SessionId) -> usize {
        let joined = self
            .memberships
            .remove(&session_id)
            .map(|(_, joined)| joined)
            .unwrap_or_default();

        joined
            .iter()
            .filter(|courier_id| self.remove_from_room(session_id, courier_id))
            .count()
    }

    pub fn is_member(&self, session_id: SessionId, courier_id: &str) -> bool {
        self.rooms
            .get(courier_id)
            .is_some_and(|members| members.contains(&session_id))
    }

    pub fn room_members(&self, courier_id: &str) -> Vec<SessionId> {
        self.rooms
            .get(courier_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Sends to every session currently in the courier's room. Returns how
    /// many sessions the event was queued for; an empty room yields zero.
    pub fn publish_to_room(&self, courier_id: &str, event: ServerEvent) -> usize {
        let members = self.room_members(courier_id);
        if members.is_empty() {
            return 0;
        }

        let targets: Vec<(SessionId, mpsc::Sender<ServerEvent>)> = members
            .into_iter()
            .filter_map(|id| self.sessions.get(&id).map(|tx| (id, tx.value().clone())))
            .collect();

        self.deliver(targets, event)
    }

    /// Sends to every connected session regardless of room membership.
    pub fn publish_global(&self, event: ServerEvent) -> usize {
        let targets: Vec<(SessionId, mpsc::Sender<ServerEvent>)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        self.deliver(targets, event)
    }

    /// Direct reply to one session.
    pub fn send_to(&self, session_id: SessionId, event: ServerEvent) -> bool {
        let Some(tx) = self.sessions.get(&session_id).map(|tx| tx.value().clone()) else {
            return false;
        };

        self.deliver(vec![(session_id, tx)], event) == 1
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Drops every session queue, which ends the transports' writer loops.
    pub fn shutdown(&self) {
        let sessions = self.sessions.len();
        self.sessions.clear();
        self.rooms.clear();
        self.memberships.clear();
        self.metrics.connected_sessions.set(0);
        info!(sessions, "session registry shut down");
    }

    fn remove_from_room(&self, session_id: SessionId, courier_id: &str) -> bool {
        let removed = self
            .rooms
            .get_mut(courier_id)
            .is_some_and(|mut members| members.remove(&session_id));
        self.rooms.remove_if(courier_id, |_, members| members.is_empty());
        removed
    }

    fn deliver(
        &self,
        targets: Vec<(SessionId, mpsc::Sender<ServerEvent>)>,
        event: ServerEvent,
    ) -> usize {
        let mut delivered = 0;

        for (session_id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.metrics.dropped_events_total.inc();
                    debug!(session_id = %session_id, "session queue full; event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    self.metrics.dropped_events_total.inc();
                }
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::SessionRegistry;
    use crate::models::events::{CourierPositionEvent, ServerEvent};
    use crate::observability::metrics::Metrics;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(16, Metrics::new())
    }

    fn update(courier_id: &str) -> ServerEvent {
        ServerEvent::CourierLocationUpdate(CourierPositionEvent {
            courier_id: courier_id.to_string(),
            lat: 41.0,
            lng: 29.0,
            speed: 0.0,
            timestamp: 0,
        })
    }

    #[test]
    fn room_isolation() {
        let registry = registry();
        let mut watcher_one = registry.connect();
        let mut watcher_two = registry.connect();

        registry.join(watcher_one.id, "c1");
        registry.join(watcher_two.id, "c2");

        assert_eq!(registry.publish_to_room("c1", update("c1")), 1);
        assert_eq!(watcher_one.events.try_recv().unwrap(), update("c1"));
        assert!(watcher_two.events.try_recv().is_err());
    }

    #[test]
    fn idempotent_join() {
        let registry = registry();
        let session = registry.connect();

        assert!(registry.join(session.id, "c1"));
        assert!(registry.join(session.id, "c1"));
        assert_eq!(registry.room_members("c1").len(), 1);

        assert!(registry.leave(session.id, "c1"));
        assert!(!registry.is_member(session.id, "c1"));
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn leave_when_not_member_is_noop() {
        let registry = registry();
        let session = registry.connect();
        assert!(!registry.leave(session.id, "c1"));
    }

    #[test]
    fn join_requires_connected_session() {
        let registry = registry();
        let session = registry.connect();
        registry.disconnect(session.id);

        assert!(!registry.join(session.id, "c1"));
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn publish_to_empty_room_is_inert() {
        let registry = registry();
        assert_eq!(registry.publish_to_room("nobody", update("nobody")), 0);
    }

    #[test]
    fn late_joiner_gets_no_replay() {
        let registry = registry();
        registry.publish_to_room("c1", update("c1"));

        let mut late = registry.connect();
        registry.join(late.id, "c1");
        assert!(late.events.try_recv().is_err());
    }

    #[test]
    fn global_reaches_every_session() {
        let registry = registry();
        let mut in_room = registry.connect();
        let mut lobby = registry.connect();
        registry.join(in_room.id, "c1");

        assert_eq!(registry.publish_global(update("c1")), 2);
        assert!(in_room.events.try_recv().is_ok());
        assert!(lobby.events.try_recv().is_ok());
    }

    #[test]
    fn disconnect_cleans_every_room() {
        let registry = registry();
        let session = registry.connect();
        registry.join(session.id, "c1");
        registry.join(session.id, "c2");

        registry.disconnect(session.id);
        registry.disconnect(session.id);

        assert!(registry.room_members("c1").is_empty());
        assert!(registry.room_members("c2").is_empty());
        assert_eq!(registry.publish_to_room("c1", update("c1")), 0);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let registry = SessionRegistry::new(1, Metrics::new());
        let mut slow = registry.connect();
        registry.join(slow.id, "c1");

        assert_eq!(registry.publish_to_room("c1", update("c1")), 1);
        assert_eq!(registry.publish_to_room("c1", update("c1")), 0);
        assert!(slow.events.try_recv().is_ok());
        assert!(slow.events.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_is_not_an_error() {
        let registry = registry();
        let session = registry.connect();
        registry.join(session.id, "c1");
        drop(session.events);

        assert_eq!(registry.publish_to_room("c1", update("c1")), 0);
    }

    #[test]
    fn shutdown_closes_queues() {
        let registry = registry();
        let mut session = registry.connect();
        registry.shutdown();

        assert_eq!(registry.session_count(), 0);
        assert!(matches!(
            session.events.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_membership_and_publish() {
        let registry = Arc::new(SessionRegistry::new(1024, Metrics::new()));
        let mut handles = Vec::new();

        for worker in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let session = registry.connect();
                for round in 0..200 {
                    let courier = format!("c{}", (worker + round) % 3);
                    registry.join(session.id, &courier);
                    registry.publish_to_room(&courier, update(&courier));
                    if round % 2 == 0 {
                        registry.leave(session.id, &courier);
                    }
                    tokio::task::yield_now().await;
                }
                registry.disconnect(session.id);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.session_count(), 0);
        assert_eq!(registry.room_count(), 0);
    }
}
