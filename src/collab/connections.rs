//! Live connections and the identity bound to each.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{ConnectionId, RoomId};
use crate::models::{Identity, ServerMessage};

/// Outbound queue of a single connection.
pub type Outbox = mpsc::Sender<ServerMessage>;

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub identity: Identity,
    /// `None` while authenticated but not joined.
    pub current_room: Option<RoomId>,
    pub outbox: Outbox,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: Identity, outbox: Outbox) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            Connection {
                id,
                identity,
                current_room: None,
                outbox,
                connected_at: Utc::now(),
            },
        );
        id
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(id)
    }

    pub fn current_room(&self, id: &ConnectionId) -> Option<&RoomId> {
        self.connections.get(id)?.current_room.as_ref()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
