//! `Launchpad` Core Library
//!
//! Shared functionality for `Launchpad` components:
//! - Project data model and marker file format
//! - Recursive project discovery
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod project;
pub mod tracing_init;

pub use config::Config;
pub use discovery::{discover, resolve_project};
pub use error::{Error, Result};
pub use project::{Project, ProjectConfig, ProjectStatus, ProjectView, project_id};
