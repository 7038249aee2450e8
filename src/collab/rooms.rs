//! Room membership.
//!
//! A user is a member of a room while at least one of their connections is
//! joined to it. A room is created on first join and only removed by
//! [`RoomRegistry::sweep_empty`].

use std::collections::{BTreeMap, HashMap, HashSet};

use super::{ConnectionId, RoomId, UserId};
use crate::models::RoomMember;

#[derive(Debug)]
struct Member {
    display_name: String,
    connections: HashSet<ConnectionId>,
}

#[derive(Debug, Default)]
struct Room {
    members: BTreeMap<UserId, Member>,
}

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    /// user → rooms they are a member of, for the per-user room limit.
    user_rooms: HashMap<UserId, HashSet<RoomId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if needed. Returns true
    /// when the user was not a member before.
    pub fn join(
        &mut self,
        room_id: &str,
        user_id: &str,
        display_name: &str,
        connection_id: ConnectionId,
    ) -> bool {
        let room = self.rooms.entry(room_id.to_string()).or_default();
        let newly_joined = !room.members.contains_key(user_id);
        room.members
            .entry(user_id.to_string())
            .or_insert_with(|| Member {
                display_name: display_name.to_string(),
                connections: HashSet::new(),
            })
            .connections
            .insert(connection_id);
        if newly_joined {
            self.user_rooms
                .entry(user_id.to_string())
                .or_default()
                .insert(room_id.to_string());
        }
        newly_joined
    }

    /// Remove a connection from a room. Returns true when this was the user's
    /// last connection there, i.e. the user is no longer a member.
    pub fn leave(&mut self, room_id: &str, user_id: &str, connection_id: ConnectionId) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let Some(member) = room.members.get_mut(user_id) else {
            return false;
        };
        if !member.connections.remove(&connection_id) || !member.connections.is_empty() {
            return false;
        }
        room.members.remove(user_id);
        if let Some(rooms) = self.user_rooms.get_mut(user_id) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                self.user_rooms.remove(user_id);
            }
        }
        true
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn is_member(&self, room_id: &str, user_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|room| room.members.contains_key(user_id))
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |room| room.members.len())
    }

    /// Number of distinct rooms the user is currently a member of.
    pub fn rooms_of_user(&self, user_id: &str) -> usize {
        self.user_rooms.get(user_id).map_or(0, HashSet::len)
    }

    /// Number of the user's connections joined to the room.
    pub fn connections_of_user(&self, room_id: &str, user_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .and_then(|room| room.members.get(user_id))
            .map_or(0, |member| member.connections.len())
    }

    /// Members of a room ordered by user id, optionally leaving one user out.
    pub fn members(&self, room_id: &str, except: Option<&str>) -> Vec<RoomMember> {
        let Some(room) = self.rooms.get(room_id) else {
            return Vec::new();
        };
        room.members
            .iter()
            .filter(|(user_id, _)| Some(user_id.as_str()) != except)
            .map(|(user_id, member)| RoomMember {
                user_id: user_id.clone(),
                display_name: member.display_name.clone(),
            })
            .collect()
    }

    /// Every connection joined to the room.
    pub fn connections(&self, room_id: &str) -> Vec<ConnectionId> {
        let Some(room) = self.rooms.get(room_id) else {
            return Vec::new();
        };
        room.members
            .values()
            .flat_map(|member| member.connections.iter().copied())
            .collect()
    }

    /// Delete rooms with no members. Returns the removed room ids.
    pub fn sweep_empty(&mut self) -> Vec<RoomId> {
        let empty: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, room)| room.members.is_empty())
            .map(|(room_id, _)| room_id.clone())
            .collect();
        for room_id in &empty {
            self.rooms.remove(room_id);
        }
        empty
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn empty_room_count(&self) -> usize {
        self.rooms.values().filter(|room| room.members.is_empty()).count()
    }
}
