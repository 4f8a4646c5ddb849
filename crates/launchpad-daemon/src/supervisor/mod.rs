//! Process lifecycle supervision for discovered projects.

mod manager;
mod output;
pub mod terminate;
mod types;

pub use manager::Supervisor;
pub use types::{ExitEvent, RunningProcess, SupervisorError};
