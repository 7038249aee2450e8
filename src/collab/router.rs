//! Fan-out of server messages to room members.
//!
//! Delivery never blocks: each connection has a bounded outbox and a full or
//! closed outbox just drops the message for that peer.

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::connections::ConnectionRegistry;
use super::ConnectionId;
use crate::models::ServerMessage;

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
}

#[derive(Debug, Default)]
pub struct BroadcastRouter {
    stats: RelayStats,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to a single connection.
    pub fn send_to(
        &mut self,
        connections: &ConnectionRegistry,
        target: ConnectionId,
        msg: ServerMessage,
    ) -> bool {
        let Some(conn) = connections.get(&target) else {
            debug!(connection_id = %target, "Dropping message for unknown connection");
            self.stats.messages_dropped += 1;
            return false;
        };
        match conn.outbox.try_send(msg) {
            Ok(()) => {
                self.stats.messages_sent += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %target, user_id = %conn.identity.user_id, "Outbound queue full, dropping message");
                self.stats.messages_dropped += 1;
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection_id = %target, "Outbound queue closed, dropping message");
                self.stats.messages_dropped += 1;
                false
            }
        }
    }

    /// Deliver a message to every recipient except `sender`. Returns how many
    /// deliveries succeeded.
    pub fn broadcast(
        &mut self,
        connections: &ConnectionRegistry,
        recipients: &[ConnectionId],
        sender: Option<ConnectionId>,
        msg: &ServerMessage,
    ) -> usize {
        let mut delivered = 0;
        for id in recipients.iter().copied() {
            if Some(id) == sender {
                continue;
            }
            if self.send_to(connections, id, msg.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }
}
