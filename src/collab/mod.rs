//! Real-time collaboration coordinator.
//!
//! ```text
//! socket task ──┐                      ┌── ConnectionRegistry (identity, current room, outbox)
//! socket task ──┼── Command (mpsc) ──► Coordinator ──┼── RoomRegistry (room → members)
//! socket task ──┘     one at a time    │             ├── LockTable (room → element → holder)
//!                                      │             └── BroadcastRouter (fan-out, sender excluded)
//!                                      └── sweep timer (empty rooms)
//! ```
//!
//! All registries are owned by a single [`Coordinator`] value, which is
//! driven by one task ([`service::spawn`]). Every inbound message is handled
//! to completion before the next one is looked at.

pub mod activity;
pub mod connections;
pub mod coordinator;
pub mod error;
pub mod locks;
pub mod rooms;
pub mod router;
pub mod service;

pub type RoomId = String;
pub type UserId = String;
pub type ElementId = String;
pub type ConnectionId = uuid::Uuid;

pub use activity::{ActivityHook, NoopActivity, TracingActivity};
pub use coordinator::{CollabLimits, Coordinator, CoordinatorStats};
pub use error::CollabError;
pub use locks::LockOutcome;
pub use service::CoordinatorHandle;
