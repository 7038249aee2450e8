//! Runs a [`Coordinator`] on its own task.
//!
//! Socket tasks talk to the coordinator through [`CoordinatorHandle`]; the
//! task applies commands strictly one at a time and also owns the empty-room
//! sweep timer.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::connections::Outbox;
use super::coordinator::{Coordinator, CoordinatorStats};
use super::ConnectionId;
use crate::models::{ClientMessage, Identity};

enum Command {
    Connect {
        identity: Identity,
        outbox: Outbox,
        reply: oneshot::Sender<ConnectionId>,
    },
    Message {
        connection_id: ConnectionId,
        msg: ClientMessage,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Stats {
        reply: oneshot::Sender<CoordinatorStats>,
    },
    Shutdown,
}

/// Cloneable front for a running coordinator task.
#[derive(Clone, Debug)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
}

/// Start the coordinator task. The sweep timer first fires one
/// `sweep_interval` after start.
pub fn spawn(
    coordinator: Coordinator,
    sweep_interval: Duration,
    command_buffer: usize,
) -> (CoordinatorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(command_buffer.max(1));
    let task = tokio::spawn(run(coordinator, rx, sweep_interval));
    (CoordinatorHandle { commands: tx }, task)
}

async fn run(
    mut coordinator: Coordinator,
    mut commands: mpsc::Receiver<Command>,
    sweep_interval: Duration,
) {
    let mut sweep = time::interval_at(Instant::now() + sweep_interval, sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(sweep_secs = sweep_interval.as_secs(), "Coordinator started");

    loop {
        tokio::select! {
            biased;

            _ = sweep.tick() => {
                coordinator.sweep_empty_rooms();
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => apply(&mut coordinator, cmd),
                }
            }
        }
    }

    let stats = coordinator.stats();
    info!(
        connections = stats.connections,
        rooms = stats.rooms,
        "Coordinator stopped"
    );
    // Dropping the coordinator closes every outbox, which ends the socket writers.
    drop(coordinator);
}

fn apply(coordinator: &mut Coordinator, cmd: Command) {
    match cmd {
        Command::Connect {
            identity,
            outbox,
            reply,
        } => {
            let id = coordinator.connect(identity, outbox);
            if reply.send(id).is_err() {
                // Caller went away before we answered
                coordinator.disconnect(id);
            }
        }
        Command::Message { connection_id, msg } => {
            debug!(connection_id = %connection_id, kind = msg.kind(), "Dispatching message");
            coordinator.handle(connection_id, msg);
        }
        Command::Disconnect { connection_id } => {
            coordinator.disconnect(connection_id);
        }
        Command::Stats { reply } => {
            let _ = reply.send(coordinator.stats());
        }
        Command::Shutdown => {}
    }
}

impl CoordinatorHandle {
    /// Register an authenticated connection. `None` if the coordinator has
    /// stopped.
    pub async fn connect(&self, identity: Identity, outbox: Outbox) -> Option<ConnectionId> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect {
                identity,
                outbox,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Queue an inbound message. Messages from one caller are applied in the
    /// order they were queued.
    pub async fn dispatch(&self, connection_id: ConnectionId, msg: ClientMessage) -> bool {
        self.commands
            .send(Command::Message { connection_id, msg })
            .await
            .is_ok()
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let _ = self
            .commands
            .send(Command::Disconnect { connection_id })
            .await;
    }

    /// Non-async disconnect for drop paths. Falls back to a spawned send when
    /// the command queue is full.
    pub fn release(&self, connection_id: ConnectionId) {
        match self.commands.try_send(Command::Disconnect { connection_id }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                let commands = self.commands.clone();
                tokio::spawn(async move {
                    let _ = commands.send(cmd).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection_id = %connection_id, "Coordinator already stopped");
            }
        }
    }

    pub async fn stats(&self) -> Option<CoordinatorStats> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Stats { reply }).await.ok()?;
        rx.await.ok()
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Stop the coordinator: the sweep timer stops and all state is dropped.
    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).await.is_err() {
            warn!("Coordinator already stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::CollabLimits;
    use crate::models::{JoinRoomMessage, LeaveRoomMessage, ServerMessage};

    fn start(sweep_secs: u64) -> (CoordinatorHandle, JoinHandle<()>) {
        spawn(
            Coordinator::new(CollabLimits::default()),
            Duration::from_secs(sweep_secs),
            16,
        )
    }

    fn join_msg(room: &str) -> ClientMessage {
        ClientMessage::JoinRoom(JoinRoomMessage {
            room_id: room.to_string(),
        })
    }

    #[tokio::test]
    async fn test_connect_dispatch_and_reply() {
        let (handle, _task) = start(60);
        let (tx, mut rx) = mpsc::channel(8);
        let id = handle.connect(Identity::new("alice", "Alice"), tx).await.unwrap();

        assert!(handle.dispatch(id, join_msg("page-1")).await);
        match rx.recv().await {
            Some(ServerMessage::RoomMembers(snapshot)) => {
                assert_eq!(snapshot.room_id, "page-1");
                assert!(snapshot.members.is_empty());
            }
            other => panic!("Expected room-members, got {other:?}"),
        }

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.rooms, 1);
    }

    #[tokio::test]
    async fn test_instances_are_independent() {
        let (first, _t1) = start(60);
        let (second, _t2) = start(60);
        let (tx, _rx) = mpsc::channel(8);
        let id = first.connect(Identity::new("alice", "Alice"), tx).await.unwrap();
        first.dispatch(id, join_msg("page-1")).await;

        assert_eq!(first.stats().await.unwrap().rooms, 1);
        assert_eq!(second.stats().await.unwrap().rooms, 0);
    }

    #[tokio::test]
    async fn test_release_disconnects_from_sync_code() {
        let (handle, _task) = start(60);
        let (tx, _rx) = mpsc::channel(8);
        let id = handle.connect(Identity::new("alice", "Alice"), tx).await.unwrap();

        handle.release(id);
        assert_eq!(handle.stats().await.unwrap().connections, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_room_is_swept_after_interval() {
        let (handle, _task) = start(60);
        let (tx, _rx) = mpsc::channel(8);
        let id = handle.connect(Identity::new("alice", "Alice"), tx).await.unwrap();
        handle.dispatch(id, join_msg("page-1")).await;
        handle
            .dispatch(id, ClientMessage::LeaveRoom(LeaveRoomMessage::default()))
            .await;

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.rooms, 1);
        assert_eq!(stats.empty_rooms, 1);

        time::sleep(Duration::from_secs(61)).await;
        assert_eq!(handle.stats().await.unwrap().rooms, 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_outboxes() {
        let (handle, task) = start(60);
        let (tx, mut rx) = mpsc::channel(8);
        handle.connect(Identity::new("alice", "Alice"), tx).await.unwrap();

        handle.shutdown().await;
        task.await.unwrap();

        assert!(rx.recv().await.is_none());
        assert!(!handle.is_running());
        assert!(handle.stats().await.is_none());
    }
}
