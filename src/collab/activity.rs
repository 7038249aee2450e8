//! Best-effort activity notifications for relayed element updates.

use tracing::debug;

/// Receives a notification for every relayed element update. Errors are
/// logged by the coordinator and otherwise ignored.
pub trait ActivityHook: Send {
    fn element_updated(&self, room_id: &str, user_id: &str, element_id: &str)
        -> Result<(), String>;
}

#[derive(Debug, Default)]
pub struct NoopActivity;

impl ActivityHook for NoopActivity {
    fn element_updated(&self, _: &str, _: &str, _: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Emits each update as a structured `debug!` event.
#[derive(Debug, Default)]
pub struct TracingActivity;

impl ActivityHook for TracingActivity {
    fn element_updated(&self, room_id: &str, user_id: &str, element_id: &str) -> Result<(), String> {
        debug!(target: "canvas_collab::activity", room_id = %room_id, user_id = %user_id, element_id = %element_id, "element updated");
        Ok(())
    }
}
