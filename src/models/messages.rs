use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collab::{ElementId, RoomId, UserId};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomMessage {
    pub room_id: RoomId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomMessage {
    #[serde(default)]
    pub room_id: Option<RoomId>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementRefMessage {
    pub element_id: ElementId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementUpdateMessage {
    pub element_id: ElementId,
    #[serde(default)]
    pub updates: Value,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ElementSelectMessage {
    #[serde(default)]
    pub element_id: Option<ElementId>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CursorMoveMessage {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Empty payload for kinds that carry no fields (`typing-stop`, `ping`, `logout`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct EmptyMessage {}

/// Messages accepted from a client, tagged by `type`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join-room")]
    JoinRoom(JoinRoomMessage),
    #[serde(rename = "leave-room")]
    LeaveRoom(LeaveRoomMessage),
    #[serde(rename = "lock-element")]
    LockElement(ElementRefMessage),
    #[serde(rename = "unlock-element")]
    UnlockElement(ElementRefMessage),
    #[serde(rename = "element-update")]
    ElementUpdate(ElementUpdateMessage),
    #[serde(rename = "element-select")]
    ElementSelect(ElementSelectMessage),
    #[serde(rename = "cursor-move")]
    CursorMove(CursorMoveMessage),
    #[serde(rename = "typing-start")]
    TypingStart(ElementRefMessage),
    #[serde(rename = "typing-stop")]
    TypingStop(EmptyMessage),
    #[serde(rename = "ping")]
    Ping(EmptyMessage),
    #[serde(rename = "logout")]
    Logout(EmptyMessage),
}

impl ClientMessage {
    /// Wire name of the message kind, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinRoom(_) => "join-room",
            ClientMessage::LeaveRoom(_) => "leave-room",
            ClientMessage::LockElement(_) => "lock-element",
            ClientMessage::UnlockElement(_) => "unlock-element",
            ClientMessage::ElementUpdate(_) => "element-update",
            ClientMessage::ElementSelect(_) => "element-select",
            ClientMessage::CursorMove(_) => "cursor-move",
            ClientMessage::TypingStart(_) => "typing-start",
            ClientMessage::TypingStop(_) => "typing-stop",
            ClientMessage::Ping(_) => "ping",
            ClientMessage::Logout(_) => "logout",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub user_id: UserId,
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementLock {
    pub element_id: ElementId,
    pub user_id: UserId,
}

/// What a joiner gets back: everyone who was already in the room, and the
/// locks currently held there.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomMembersMessage {
    pub room_id: RoomId,
    pub members: Vec<RoomMember>,
    pub locks: Vec<ElementLock>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum JoinRejectReason {
    RoomFull,
    TooManyRooms,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRejectedMessage {
    pub room_id: RoomId,
    pub reason: JoinRejectReason,
    pub limit: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedMessage {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub display_name: String,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftMessage {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementLockDeniedMessage {
    pub element_id: ElementId,
    pub owner: UserId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementUpdatedMessage {
    pub element_id: ElementId,
    pub updates: Value,
    pub user_id: UserId,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementSelectedMessage {
    pub element_id: Option<ElementId>,
    pub user_id: UserId,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CursorMovedMessage {
    pub x: f64,
    pub y: f64,
    pub user_id: UserId,
    pub display_name: String,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserTypingMessage {
    pub element_id: ElementId,
    pub user_id: UserId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStoppedTypingMessage {
    pub user_id: UserId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
}

/// Messages pushed to a client, tagged by `type`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "room-members")]
    RoomMembers(RoomMembersMessage),
    #[serde(rename = "join-rejected")]
    JoinRejected(JoinRejectedMessage),
    #[serde(rename = "user-joined")]
    UserJoined(UserJoinedMessage),
    #[serde(rename = "user-left")]
    UserLeft(UserLeftMessage),
    #[serde(rename = "element-locked")]
    ElementLocked(ElementLock),
    #[serde(rename = "element-lock-denied")]
    ElementLockDenied(ElementLockDeniedMessage),
    #[serde(rename = "element-unlocked")]
    ElementUnlocked(ElementLock),
    #[serde(rename = "element-updated")]
    ElementUpdated(ElementUpdatedMessage),
    #[serde(rename = "element-selected")]
    ElementSelected(ElementSelectedMessage),
    #[serde(rename = "cursor-moved")]
    CursorMoved(CursorMovedMessage),
    #[serde(rename = "user-typing")]
    UserTyping(UserTypingMessage),
    #[serde(rename = "user-stopped-typing")]
    UserStoppedTyping(UserStoppedTypingMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage {
            code: code.to_string(),
            message: message.into(),
        })
    }
}
