use thiserror::Error;

use super::{ElementId, RoomId, UserId};

/// Local, recoverable failures of room-scoped operations. None of these
/// close the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollabError {
    #[error("connection is not in a room")]
    NotInRoom,

    #[error("room {room_id} is full ({limit} members)")]
    RoomFull { room_id: RoomId, limit: usize },

    #[error("user is already in {limit} rooms")]
    TooManyRooms { limit: usize },

    #[error("element {element_id} is locked by {owner}")]
    LockConflict { element_id: ElementId, owner: UserId },

    #[error("unknown connection")]
    UnknownConnection,
}
