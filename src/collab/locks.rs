//! Advisory element locks, one holder per (room, element).

use std::collections::HashMap;

use super::{ElementId, RoomId, UserId};

/// Result of a lock request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// The lock was free and now belongs to the requester.
    Granted,
    /// The requester already held it.
    AlreadyHeld,
    Denied { holder: UserId },
}

impl LockOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, LockOutcome::Granted | LockOutcome::AlreadyHeld)
    }
}

#[derive(Debug, Default)]
pub struct LockTable {
    rooms: HashMap<RoomId, HashMap<ElementId, UserId>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, room_id: &str, element_id: &str, user_id: &str) -> LockOutcome {
        let locks = self.rooms.entry(room_id.to_string()).or_default();
        match locks.get(element_id) {
            Some(holder) if holder == user_id => LockOutcome::AlreadyHeld,
            Some(holder) => LockOutcome::Denied {
                holder: holder.clone(),
            },
            None => {
                locks.insert(element_id.to_string(), user_id.to_string());
                LockOutcome::Granted
            }
        }
    }

    /// Release a lock. Only the holder can release; anyone else is ignored.
    pub fn release(&mut self, room_id: &str, element_id: &str, user_id: &str) -> bool {
        let Some(locks) = self.rooms.get_mut(room_id) else {
            return false;
        };
        if locks.get(element_id).map(String::as_str) != Some(user_id) {
            return false;
        }
        locks.remove(element_id);
        if locks.is_empty() {
            self.rooms.remove(room_id);
        }
        true
    }

    /// Release every lock `user_id` holds in `room_id`. Returns the released
    /// element ids in sorted order.
    pub fn release_all(&mut self, room_id: &str, user_id: &str) -> Vec<ElementId> {
        let Some(locks) = self.rooms.get_mut(room_id) else {
            return Vec::new();
        };
        let mut released: Vec<ElementId> = locks
            .iter()
            .filter(|(_, holder)| holder.as_str() == user_id)
            .map(|(element_id, _)| element_id.clone())
            .collect();
        for element_id in &released {
            locks.remove(element_id);
        }
        if locks.is_empty() {
            self.rooms.remove(room_id);
        }
        released.sort();
        released
    }

    pub fn holder(&self, room_id: &str, element_id: &str) -> Option<&UserId> {
        self.rooms.get(room_id)?.get(element_id)
    }

    /// All locks held in a room, sorted by element id.
    pub fn locks_in(&self, room_id: &str) -> Vec<(ElementId, UserId)> {
        let mut locks: Vec<(ElementId, UserId)> = self
            .rooms
            .get(room_id)
            .map(|locks| {
                locks
                    .iter()
                    .map(|(element_id, holder)| (element_id.clone(), holder.clone()))
                    .collect()
            })
            .unwrap_or_default();
        locks.sort();
        locks
    }

    pub fn drop_room(&mut self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    pub fn len(&self) -> usize {
        self.rooms.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
