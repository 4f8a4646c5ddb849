//! Supervisor types.

use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

/// Emitted once for every supervised process that exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitEvent {
    pub id: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

/// Snapshot of a process the supervisor spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningProcess {
    pub id: String,
    pub pid: Option<u32>,
    pub started_at: SystemTime,
}

/// Table row for a spawned process. The child itself is owned by its exit
/// watcher task.
pub(crate) struct RunningEntry {
    pub id: String,
    /// Distinguishes successive runs of the same project id.
    pub run_id: uuid::Uuid,
    pub pid: Option<u32>,
    pub started_at: SystemTime,
    /// Flips to `true` once the child has been reaped.
    pub exited: watch::Receiver<bool>,
    /// Asks the watcher to kill the direct child.
    pub kill_tx: mpsc::Sender<()>,
}

impl RunningEntry {
    pub fn is_running(&self) -> bool {
        !*self.exited.borrow()
    }

    pub fn snapshot(&self) -> RunningProcess {
        RunningProcess {
            id: self.id.clone(),
            pid: self.pid,
            started_at: self.started_at,
        }
    }
}

/// Errors from supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Project is already running: {id}")]
    AlreadyRunning { id: String },

    #[error("No start command defined for project: {id}")]
    MissingCommand { id: String },

    #[error("Failed to spawn project {id}: {reason}")]
    SpawnFailed { id: String, reason: String },
}
