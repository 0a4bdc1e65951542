//! Realtime coordination hub
//!
//! A single-writer actor that owns the active viewer connections and the
//! shared edit-lock table. Everything else talks to it through a cloneable
//! [`HubHandle`]; no caller ever touches hub state directly.
//!
//! ## Events
//!
//! - `Register` - add a connection and send it the current lock snapshot
//! - `Unregister` - drop a connection (idempotent)
//! - `BroadcastNames` - fan a `names` message out to every connection
//! - `Lock` / `Unlock` - mutate the lock table and schedule a notification
//!
//! Lock notifications are coalesced: the notify channel holds at most one
//! pending signal, and queued events are always drained before it, so a burst
//! of lock/unlock events produces one `locks` snapshot.
//!
//! Each connection has a bounded outbound queue. The hub never waits on a
//! viewer; a connection whose queue is full or closed is dropped.

pub mod protocol;
pub mod session;

pub use protocol::{ClientMessage, ServerMessage};
pub use session::serve_connection;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{BoardError, Result};

/// Identity of one registered viewer connection
pub type ConnectionId = Uuid;

/// Messages are built once and shared by every recipient
pub type Outbound = Arc<ServerMessage>;

/// Hub configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound messages buffered per connection
    pub outbound_buffer: usize,
    /// Queued events before submitters wait
    pub event_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 32,
            event_buffer: 256,
        }
    }
}

enum HubEvent {
    Register {
        id: ConnectionId,
        outbound: mpsc::Sender<Outbound>,
    },
    Unregister(ConnectionId),
    BroadcastNames(BTreeMap<String, String>),
    Lock(String),
    Unlock(String),
    Locks(oneshot::Sender<BTreeMap<String, bool>>),
    ConnectionCount(oneshot::Sender<usize>),
}

/// A registered connection's end of the hub
pub struct Connection {
    pub id: ConnectionId,
    pub outbound: mpsc::Receiver<Outbound>,
}

/// Cloneable submitter for hub events
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
    outbound_buffer: usize,
}

impl HubHandle {
    /// Register a new viewer; its first outbound message is the lock snapshot
    pub async fn register(&self) -> Result<Connection> {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        self.submit(HubEvent::Register { id, outbound: tx }).await?;
        Ok(Connection { id, outbound: rx })
    }

    pub async fn unregister(&self, id: ConnectionId) -> Result<()> {
        self.submit(HubEvent::Unregister(id)).await
    }

    pub async fn broadcast_names(&self, names: BTreeMap<String, String>) -> Result<()> {
        self.submit(HubEvent::BroadcastNames(names)).await
    }

    pub async fn lock(&self, username: impl Into<String>) -> Result<()> {
        self.submit(HubEvent::Lock(username.into())).await
    }

    pub async fn unlock(&self, username: impl Into<String>) -> Result<()> {
        self.submit(HubEvent::Unlock(username.into())).await
    }

    /// Snapshot of the lock table as seen by the control loop
    pub async fn locks(&self) -> Result<BTreeMap<String, bool>> {
        let (tx, rx) = oneshot::channel();
        self.submit(HubEvent::Locks(tx)).await?;
        rx.await
            .map_err(|_| BoardError::HubClosed("snapshot dropped".into()))
    }

    pub async fn connection_count(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.submit(HubEvent::ConnectionCount(tx)).await?;
        rx.await
            .map_err(|_| BoardError::HubClosed("count dropped".into()))
    }

    pub fn is_running(&self) -> bool {
        !self.events.is_closed()
    }

    async fn submit(&self, event: HubEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| BoardError::HubClosed("control loop stopped".into()))
    }
}

/// Hub state, owned by the control loop task
pub struct Hub {
    connections: HashMap<ConnectionId, mpsc::Sender<Outbound>>,
    locks: BTreeMap<String, bool>,
    events: mpsc::Receiver<HubEvent>,
    notify_tx: mpsc::Sender<()>,
    notify_rx: mpsc::Receiver<()>,
}

impl Hub {
    /// Start the control loop; it stops once every handle is dropped
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let (notify_tx, notify_rx) = mpsc::channel(1);

        let hub = Hub {
            connections: HashMap::new(),
            locks: BTreeMap::new(),
            events: events_rx,
            notify_tx,
            notify_rx,
        };

        tokio::spawn(hub.run());

        HubHandle {
            events: events_tx,
            outbound_buffer: config.outbound_buffer.max(1),
        }
    }

    async fn run(mut self) {
        info!("Realtime hub started");

        loop {
            tokio::select! {
                biased;

                event = self.events.recv() => match event {
                    Some(event) => self.apply(event),
                    None => break,
                },

                Some(()) = self.notify_rx.recv() => {
                    let snapshot = self.locks_message();
                    self.deliver_all(snapshot);
                }
            }
        }

        info!(connections = self.connections.len(), "Realtime hub stopped");
    }

    fn apply(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register { id, outbound } => {
                let snapshot = self.locks_message();
                if outbound.try_send(snapshot).is_err() {
                    warn!(connection = %id, "Connection closed before registration");
                    return;
                }
                self.connections.insert(id, outbound);
                debug!(connection = %id, total = self.connections.len(), "Connection registered");
            }
            HubEvent::Unregister(id) => {
                if self.connections.remove(&id).is_some() {
                    debug!(connection = %id, total = self.connections.len(), "Connection unregistered");
                }
            }
            HubEvent::BroadcastNames(names) => {
                debug!(trainees = names.len(), "Broadcasting display names");
                self.deliver_all(Arc::new(ServerMessage::Names { names }));
            }
            HubEvent::Lock(username) => {
                self.locks.insert(username, true);
                self.schedule_notify();
            }
            HubEvent::Unlock(username) => {
                self.locks.remove(&username);
                self.schedule_notify();
            }
            HubEvent::Locks(reply) => {
                let _ = reply.send(self.locks.clone());
            }
            HubEvent::ConnectionCount(reply) => {
                let _ = reply.send(self.connections.len());
            }
        }
    }

    /// At most one notification is ever pending
    fn schedule_notify(&self) {
        let _ = self.notify_tx.try_send(());
    }

    fn locks_message(&self) -> Outbound {
        Arc::new(ServerMessage::Locks {
            locks: self.locks.clone(),
        })
    }

    /// Queue `message` for every connection, dropping those that cannot take it
    fn deliver_all(&mut self, message: Outbound) {
        let mut dropped = Vec::new();

        for (id, outbound) in &self.connections {
            match outbound.try_send(Arc::clone(&message)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(connection = %id, "Outbound queue full, disconnecting viewer");
                    dropped.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(connection = %id, "Outbound queue closed");
                    dropped.push(*id);
                }
            }
        }

        for id in dropped {
            self.connections.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn locks(keys: &[&str]) -> ServerMessage {
        ServerMessage::Locks {
            locks: keys.iter().map(|k| (k.to_string(), true)).collect(),
        }
    }

    async fn next(conn: &mut Connection) -> ServerMessage {
        let msg = tokio::time::timeout(Duration::from_secs(1), conn.outbound.recv())
            .await
            .expect("timed out waiting for hub")
            .expect("outbound closed");
        (*msg).clone()
    }

    #[tokio::test]
    async fn test_register_gets_empty_snapshot_first() {
        let hub = Hub::spawn(HubConfig::default());
        let mut conn = hub.register().await.unwrap();

        assert_eq!(next(&mut conn).await, locks(&[]));
        assert_eq!(hub.connection_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_register_sees_existing_locks() {
        let hub = Hub::spawn(HubConfig::default());
        hub.lock("user1").await.unwrap();
        hub.lock("user2").await.unwrap();

        let mut conn = hub.register().await.unwrap();
        assert_eq!(next(&mut conn).await, locks(&["user1", "user2"]));
    }

    #[tokio::test]
    async fn test_lock_is_idempotent() {
        let hub = Hub::spawn(HubConfig::default());

        hub.lock("user1").await.unwrap();
        let once = hub.locks().await.unwrap();
        hub.lock("user1").await.unwrap();
        let twice = hub.locks().await.unwrap();
        assert_eq!(once, twice);

        hub.unlock("user9").await.unwrap();
        assert_eq!(hub.locks().await.unwrap(), once);

        hub.unlock("user1").await.unwrap();
        assert!(hub.locks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_one_snapshot() {
        let hub = Hub::spawn(HubConfig::default());
        let mut conn = hub.register().await.unwrap();
        assert_eq!(next(&mut conn).await, locks(&[]));

        // Queued without yielding, so the hub sees the whole burst at once
        for i in 1..=5 {
            hub.lock(format!("user{}", i)).await.unwrap();
        }
        hub.unlock("user2").await.unwrap();
        hub.unlock("user4").await.unwrap();

        assert_eq!(next(&mut conn).await, locks(&["user1", "user3", "user5"]));

        // Round trip through the loop, then nothing else may be queued
        hub.locks().await.unwrap();
        let mut pending = tokio_test::task::spawn(conn.outbound.recv());
        tokio_test::assert_pending!(pending.poll());
    }

    #[tokio::test]
    async fn test_names_fan_out() {
        let hub = Hub::spawn(HubConfig::default());
        let mut a = hub.register().await.unwrap();
        let mut b = hub.register().await.unwrap();
        next(&mut a).await;
        next(&mut b).await;

        let names = BTreeMap::from([("user1".to_string(), "Alice".to_string())]);
        hub.broadcast_names(names.clone()).await.unwrap();

        let expected = ServerMessage::Names { names };
        assert_eq!(next(&mut a).await, expected);
        assert_eq!(next(&mut b).await, expected);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let hub = Hub::spawn(HubConfig::default());
        let mut conn = hub.register().await.unwrap();
        next(&mut conn).await;

        hub.unregister(conn.id).await.unwrap();
        hub.unregister(conn.id).await.unwrap();
        assert_eq!(hub.connection_count().await.unwrap(), 0);

        // The hub released its sender, so the queue drains to closed
        assert!(conn.outbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_full_queue_disconnects_only_that_viewer() {
        let hub = Hub::spawn(HubConfig {
            outbound_buffer: 1,
            ..Default::default()
        });

        // Never read: the registration snapshot fills its queue
        let mut stalled = hub.register().await.unwrap();
        let mut live = hub.register().await.unwrap();
        next(&mut live).await;

        hub.lock("user1").await.unwrap();
        assert_eq!(next(&mut live).await, locks(&["user1"]));
        assert_eq!(hub.connection_count().await.unwrap(), 1);

        assert_eq!(next(&mut stalled).await, locks(&[]));
        assert!(stalled.outbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_receiver_is_pruned() {
        let hub = Hub::spawn(HubConfig::default());
        let gone = hub.register().await.unwrap();
        drop(gone);

        hub.broadcast_names(BTreeMap::new()).await.unwrap();
        assert_eq!(hub.connection_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hub_stops_when_handles_dropped() {
        let hub = Hub::spawn(HubConfig::default());
        let mut conn = hub.register().await.unwrap();
        next(&mut conn).await;
        drop(hub);

        assert!(conn.outbound.recv().await.is_none());
    }
}
