//! Launchpad Daemon Library
//!
//! Core functionality for the Launchpad daemon:
//! - TCP liveness probing of project ports
//! - Process supervision for discovered projects
//! - Log broadcast bus for captured output
//! - Project operations addressed by path and id

pub mod bus;
pub mod probe;
pub mod service;
pub mod supervisor;

pub use bus::{LogBus, LogChunk, OutputStream, Subscription};
pub use probe::{Prober, is_port_open};
pub use service::{ProjectService, ServiceError};
pub use supervisor::{ExitEvent, RunningProcess, Supervisor, SupervisorError};
