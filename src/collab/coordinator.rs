//! The coordinator state machine.
//!
//! Owns the connection, room and lock registries and is the only thing that
//! mutates them. Every method runs to completion without awaiting, so a
//! single owner task gets atomic handling of each inbound message.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::activity::{ActivityHook, NoopActivity};
use super::connections::{ConnectionRegistry, Outbox};
use super::error::CollabError;
use super::locks::{LockOutcome, LockTable};
use super::rooms::RoomRegistry;
use super::router::BroadcastRouter;
use super::{ConnectionId, RoomId, UserId};
use crate::models::{
    ClientMessage, CursorMovedMessage, ElementLock, ElementLockDeniedMessage,
    ElementSelectedMessage, ElementUpdatedMessage, Identity, JoinRejectReason,
    JoinRejectedMessage, PongMessage, RoomMembersMessage, ServerMessage, UserJoinedMessage,
    UserLeftMessage, UserStoppedTypingMessage, UserTypingMessage,
};

/// Admission-control limits applied on join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollabLimits {
    pub max_members_per_room: usize,
    pub max_rooms_per_user: usize,
}

impl Default for CollabLimits {
    fn default() -> Self {
        Self {
            max_members_per_room: 10,
            max_rooms_per_user: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub connections: usize,
    pub rooms: usize,
    pub empty_rooms: usize,
    pub locks: usize,
    pub messages_sent: u64,
    pub messages_dropped: u64,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub struct Coordinator {
    limits: CollabLimits,
    connections: ConnectionRegistry,
    rooms: RoomRegistry,
    locks: LockTable,
    router: BroadcastRouter,
    activity: Box<dyn ActivityHook>,
}

impl Coordinator {
    pub fn new(limits: CollabLimits) -> Self {
        Self {
            limits,
            connections: ConnectionRegistry::new(),
            rooms: RoomRegistry::new(),
            locks: LockTable::new(),
            router: BroadcastRouter::new(),
            activity: Box::new(NoopActivity),
        }
    }

    pub fn with_activity(mut self, hook: impl ActivityHook + 'static) -> Self {
        self.activity = Box::new(hook);
        self
    }

    pub fn limits(&self) -> CollabLimits {
        self.limits
    }

    /// Register an authenticated connection. It starts outside any room.
    pub fn connect(&mut self, identity: Identity, outbox: Outbox) -> ConnectionId {
        let user_id = identity.user_id.clone();
        let id = self.connections.insert(identity, outbox);
        info!(connection_id = %id, user_id = %user_id, "Connection registered");
        id
    }

    /// Tear down a connection. Calling this again for the same id does nothing.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        if self.connections.get(&id).is_none() {
            return false;
        }
        self.vacate_room(id);
        if let Some(conn) = self.connections.remove(&id) {
            let lifetime = Utc::now() - conn.connected_at;
            info!(
                connection_id = %id,
                user_id = %conn.identity.user_id,
                seconds = lifetime.num_seconds(),
                "Connection closed"
            );
        }
        true
    }

    /// Dispatch one inbound message. Replies to the sender go out from here;
    /// broadcasts to the rest of the room happen inside each operation.
    pub fn handle(&mut self, id: ConnectionId, msg: ClientMessage) {
        let kind = msg.kind();
        match msg {
            ClientMessage::JoinRoom(join) => match self.join_room(id, &join.room_id) {
                Ok(snapshot) => {
                    self.send(id, ServerMessage::RoomMembers(snapshot));
                }
                Err(CollabError::RoomFull { room_id, limit }) => {
                    self.send(id, ServerMessage::JoinRejected(JoinRejectedMessage {
                        room_id,
                        reason: JoinRejectReason::RoomFull,
                        limit,
                    }));
                }
                Err(CollabError::TooManyRooms { limit }) => {
                    self.send(id, ServerMessage::JoinRejected(JoinRejectedMessage {
                        room_id: join.room_id,
                        reason: JoinRejectReason::TooManyRooms,
                        limit,
                    }));
                }
                Err(e) => log_rejected(id, kind, &e),
            },
            ClientMessage::LeaveRoom(leave) => {
                let current = self.connections.current_room(&id).cloned();
                match leave.room_id {
                    Some(room_id) if current.as_ref() != Some(&room_id) => {
                        log_rejected(id, kind, &CollabError::NotInRoom)
                    }
                    _ => {
                        if let Err(e) = self.leave_room(id) {
                            log_rejected(id, kind, &e);
                        }
                    }
                }
            }
            ClientMessage::LockElement(lock) => match self.lock_element(id, &lock.element_id) {
                Ok(LockOutcome::Denied { holder }) => {
                    self.send(id, ServerMessage::ElementLockDenied(ElementLockDeniedMessage {
                        element_id: lock.element_id,
                        owner: holder,
                    }));
                }
                Ok(_) => {
                    let user_id = self.user_of(id).unwrap_or_default();
                    self.send(id, ServerMessage::ElementLocked(ElementLock {
                        element_id: lock.element_id,
                        user_id,
                    }));
                }
                Err(e) => log_rejected(id, kind, &e),
            },
            ClientMessage::UnlockElement(unlock) => {
                if let Err(e) = self.unlock_element(id, &unlock.element_id) {
                    log_rejected(id, kind, &e);
                }
            }
            ClientMessage::ElementUpdate(update) => {
                let result = self.relay_element_update(
                    id,
                    &update.element_id,
                    update.updates,
                    update.timestamp,
                );
                match result {
                    Ok(_) => {}
                    Err(CollabError::LockConflict { element_id, owner }) => {
                        self.send(id, ServerMessage::ElementLockDenied(ElementLockDeniedMessage {
                            element_id,
                            owner,
                        }));
                    }
                    Err(e) => log_rejected(id, kind, &e),
                }
            }
            ClientMessage::ElementSelect(select) => {
                if let Err(e) = self.relay_selection(id, select.element_id, select.timestamp) {
                    log_rejected(id, kind, &e);
                }
            }
            ClientMessage::CursorMove(cursor) => {
                if let Err(e) = self.relay_cursor_move(id, cursor.x, cursor.y, cursor.timestamp) {
                    log_rejected(id, kind, &e);
                }
            }
            ClientMessage::TypingStart(typing) => {
                if let Err(e) = self.relay_typing_start(id, &typing.element_id) {
                    log_rejected(id, kind, &e);
                }
            }
            ClientMessage::TypingStop(_) => {
                if let Err(e) = self.relay_typing_stop(id) {
                    log_rejected(id, kind, &e);
                }
            }
            ClientMessage::Ping(_) => {
                self.send(id, ServerMessage::Pong(PongMessage {
                    date: Utc::now().to_rfc3339(),
                }));
            }
            ClientMessage::Logout(_) => {
                self.disconnect(id);
            }
        }
    }

    /// Join a room, leaving the current one first if it is different.
    ///
    /// Limits are checked before anything changes: a rejected join leaves
    /// the connection exactly where it was.
    pub fn join_room(
        &mut self,
        id: ConnectionId,
        room_id: &str,
    ) -> Result<RoomMembersMessage, CollabError> {
        let conn = self.connections.get(&id).ok_or(CollabError::UnknownConnection)?;
        let identity = conn.identity.clone();
        let previous = conn.current_room.clone();

        if previous.as_deref() == Some(room_id) {
            debug!(connection_id = %id, room_id, "Already in room, resending snapshot");
            return Ok(self.snapshot(room_id, &identity.user_id));
        }

        if !self.rooms.is_member(room_id, &identity.user_id) {
            let limit = self.limits.max_members_per_room;
            if self.rooms.member_count(room_id) >= limit {
                warn!(connection_id = %id, user_id = %identity.user_id, room_id, limit, "Join rejected: room full");
                return Err(CollabError::RoomFull {
                    room_id: room_id.to_string(),
                    limit,
                });
            }

            // The room being left does not count against the limit.
            let vacated = match &previous {
                Some(prev) if self.rooms.connections_of_user(prev, &identity.user_id) == 1 => 1,
                _ => 0,
            };
            let limit = self.limits.max_rooms_per_user;
            let held = self.rooms.rooms_of_user(&identity.user_id).saturating_sub(vacated);
            if held >= limit {
                warn!(connection_id = %id, user_id = %identity.user_id, room_id, limit, "Join rejected: too many rooms");
                return Err(CollabError::TooManyRooms { limit });
            }
        }

        self.vacate_room(id);

        let newly_joined =
            self.rooms
                .join(room_id, &identity.user_id, &identity.display_name, id);
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.current_room = Some(room_id.to_string());
        }
        if newly_joined {
            self.broadcast_room(room_id, Some(id), ServerMessage::UserJoined(UserJoinedMessage {
                room_id: room_id.to_string(),
                user_id: identity.user_id.clone(),
                display_name: identity.display_name.clone(),
                timestamp: now_millis(),
            }));
        }
        info!(
            connection_id = %id,
            user_id = %identity.user_id,
            room_id,
            members = self.rooms.member_count(room_id),
            "Joined room"
        );

        Ok(self.snapshot(room_id, &identity.user_id))
    }

    /// Leave the current room.
    pub fn leave_room(&mut self, id: ConnectionId) -> Result<RoomId, CollabError> {
        if self.connections.get(&id).is_none() {
            return Err(CollabError::UnknownConnection);
        }
        self.vacate_room(id).ok_or(CollabError::NotInRoom)
    }

    pub fn lock_element(
        &mut self,
        id: ConnectionId,
        element_id: &str,
    ) -> Result<LockOutcome, CollabError> {
        let (room_id, identity) = self.room_of(id)?;
        let outcome = self.locks.acquire(&room_id, element_id, &identity.user_id);
        match &outcome {
            LockOutcome::Granted => {
                debug!(connection_id = %id, room_id = %room_id, element_id, "Lock granted");
                self.broadcast_room(&room_id, Some(id), ServerMessage::ElementLocked(ElementLock {
                    element_id: element_id.to_string(),
                    user_id: identity.user_id,
                }));
            }
            LockOutcome::AlreadyHeld => {
                debug!(connection_id = %id, room_id = %room_id, element_id, "Lock already held by requester");
            }
            LockOutcome::Denied { holder } => {
                debug!(connection_id = %id, room_id = %room_id, element_id, holder = %holder, "Lock denied");
            }
        }
        Ok(outcome)
    }

    /// Release a lock. Returns false, without error, when the caller is not
    /// the holder.
    pub fn unlock_element(
        &mut self,
        id: ConnectionId,
        element_id: &str,
    ) -> Result<bool, CollabError> {
        let (room_id, identity) = self.room_of(id)?;
        if !self.locks.release(&room_id, element_id, &identity.user_id) {
            debug!(connection_id = %id, room_id = %room_id, element_id, "Unlock by non-holder ignored");
            return Ok(false);
        }
        self.broadcast_room(&room_id, Some(id), ServerMessage::ElementUnlocked(ElementLock {
            element_id: element_id.to_string(),
            user_id: identity.user_id,
        }));
        Ok(true)
    }

    /// Relay an element update to the rest of the room, unless someone else
    /// holds the element's lock. Returns the number of deliveries.
    pub fn relay_element_update(
        &mut self,
        id: ConnectionId,
        element_id: &str,
        updates: Value,
        timestamp: Option<i64>,
    ) -> Result<usize, CollabError> {
        let (room_id, identity) = self.room_of(id)?;
        if let Some(holder) = self.locks.holder(&room_id, element_id) {
            if *holder != identity.user_id {
                debug!(connection_id = %id, room_id = %room_id, element_id, holder = %holder, "Update rejected: element locked");
                return Err(CollabError::LockConflict {
                    element_id: element_id.to_string(),
                    owner: holder.clone(),
                });
            }
        }

        let delivered = self.broadcast_room(&room_id, Some(id), ServerMessage::ElementUpdated(ElementUpdatedMessage {
            element_id: element_id.to_string(),
            updates,
            user_id: identity.user_id.clone(),
            timestamp: timestamp.unwrap_or_else(now_millis),
        }));

        if let Err(e) = self.activity.element_updated(&room_id, &identity.user_id, element_id) {
            warn!(room_id = %room_id, element_id, "Activity hook failed: {}", e);
        }
        Ok(delivered)
    }

    pub fn relay_selection(
        &mut self,
        id: ConnectionId,
        element_id: Option<String>,
        timestamp: Option<i64>,
    ) -> Result<usize, CollabError> {
        let (room_id, identity) = self.room_of(id)?;
        Ok(self.broadcast_room(&room_id, Some(id), ServerMessage::ElementSelected(ElementSelectedMessage {
            element_id,
            user_id: identity.user_id,
            timestamp: timestamp.unwrap_or_else(now_millis),
        })))
    }

    pub fn relay_cursor_move(
        &mut self,
        id: ConnectionId,
        x: f64,
        y: f64,
        timestamp: Option<i64>,
    ) -> Result<usize, CollabError> {
        let (room_id, identity) = self.room_of(id)?;
        Ok(self.broadcast_room(&room_id, Some(id), ServerMessage::CursorMoved(CursorMovedMessage {
            x,
            y,
            user_id: identity.user_id,
            display_name: identity.display_name,
            timestamp: timestamp.unwrap_or_else(now_millis),
        })))
    }

    pub fn relay_typing_start(
        &mut self,
        id: ConnectionId,
        element_id: &str,
    ) -> Result<usize, CollabError> {
        let (room_id, identity) = self.room_of(id)?;
        Ok(self.broadcast_room(&room_id, Some(id), ServerMessage::UserTyping(UserTypingMessage {
            element_id: element_id.to_string(),
            user_id: identity.user_id,
        })))
    }

    pub fn relay_typing_stop(&mut self, id: ConnectionId) -> Result<usize, CollabError> {
        let (room_id, identity) = self.room_of(id)?;
        Ok(self.broadcast_room(&room_id, Some(id), ServerMessage::UserStoppedTyping(UserStoppedTypingMessage {
            user_id: identity.user_id,
        })))
    }

    /// Drop rooms nobody is in. Returns how many were removed.
    pub fn sweep_empty_rooms(&mut self) -> usize {
        let removed = self.rooms.sweep_empty();
        for room_id in &removed {
            self.locks.drop_room(room_id);
        }
        if !removed.is_empty() {
            info!(count = removed.len(), remaining = self.rooms.len(), "Swept empty rooms");
        }
        removed.len()
    }

    pub fn stats(&self) -> CoordinatorStats {
        let relay = self.router.stats();
        CoordinatorStats {
            connections: self.connections.len(),
            rooms: self.rooms.len(),
            empty_rooms: self.rooms.empty_room_count(),
            locks: self.locks.len(),
            messages_sent: relay.messages_sent,
            messages_dropped: relay.messages_dropped,
        }
    }

    pub fn current_room(&self, id: ConnectionId) -> Option<RoomId> {
        self.connections.current_room(&id).cloned()
    }

    pub fn room_members(&self, room_id: &str) -> Vec<UserId> {
        self.rooms
            .members(room_id, None)
            .into_iter()
            .map(|member| member.user_id)
            .collect()
    }

    pub fn has_room(&self, room_id: &str) -> bool {
        self.rooms.contains(room_id)
    }

    pub fn lock_holder(&self, room_id: &str, element_id: &str) -> Option<UserId> {
        self.locks.holder(room_id, element_id).cloned()
    }

    /// The single teardown path shared by leave, room moves and disconnect.
    ///
    /// Clears the connection's room pointer. If that was the user's last
    /// connection in the room, the user stops being a member, their locks
    /// there are released and the remaining members get one `user-left`
    /// followed by one `element-unlocked` per released lock.
    fn vacate_room(&mut self, id: ConnectionId) -> Option<RoomId> {
        let conn = self.connections.get_mut(&id)?;
        let room_id = conn.current_room.take()?;
        let user_id = conn.identity.user_id.clone();

        if !self.rooms.leave(&room_id, &user_id, id) {
            debug!(connection_id = %id, user_id = %user_id, room_id = %room_id, "Connection left room, user still present");
            return Some(room_id);
        }

        let released = self.locks.release_all(&room_id, &user_id);
        self.broadcast_room(&room_id, None, ServerMessage::UserLeft(UserLeftMessage {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
            timestamp: now_millis(),
        }));
        for element_id in &released {
            self.broadcast_room(&room_id, None, ServerMessage::ElementUnlocked(ElementLock {
                element_id: element_id.clone(),
                user_id: user_id.clone(),
            }));
        }
        info!(
            connection_id = %id,
            user_id = %user_id,
            room_id = %room_id,
            released_locks = released.len(),
            "Left room"
        );
        Some(room_id)
    }

    fn room_of(&self, id: ConnectionId) -> Result<(RoomId, Identity), CollabError> {
        let conn = self.connections.get(&id).ok_or(CollabError::UnknownConnection)?;
        let room_id = conn.current_room.clone().ok_or(CollabError::NotInRoom)?;
        Ok((room_id, conn.identity.clone()))
    }

    fn user_of(&self, id: ConnectionId) -> Option<UserId> {
        self.connections.get(&id).map(|conn| conn.identity.user_id.clone())
    }

    fn snapshot(&self, room_id: &str, user_id: &str) -> RoomMembersMessage {
        RoomMembersMessage {
            room_id: room_id.to_string(),
            members: self.rooms.members(room_id, Some(user_id)),
            locks: self
                .locks
                .locks_in(room_id)
                .into_iter()
                .map(|(element_id, user_id)| ElementLock { element_id, user_id })
                .collect(),
        }
    }

    fn send(&mut self, id: ConnectionId, msg: ServerMessage) -> bool {
        self.router.send_to(&self.connections, id, msg)
    }

    fn broadcast_room(
        &mut self,
        room_id: &str,
        sender: Option<ConnectionId>,
        msg: ServerMessage,
    ) -> usize {
        let recipients = self.rooms.connections(room_id);
        self.router.broadcast(&self.connections, &recipients, sender, &msg)
    }
}

fn log_rejected(id: ConnectionId, kind: &str, err: &CollabError) {
    debug!(connection_id = %id, kind, "Request not applied: {}", err);
}
