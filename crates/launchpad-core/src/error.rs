//! Error types for `Launchpad` core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using `Launchpad` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `Launchpad` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Marker file exists but does not describe valid project configurations
    #[error("Invalid marker file {}: {reason}", path.display())]
    InvalidMarker { path: PathBuf, reason: String },

    /// No configuration in the marker file produces the requested id
    #[error("Configuration not found for project id: {id}")]
    ProjectNotFound { id: String },

    /// Requested project directory lies outside the scan root
    #[error("Project path is outside the scan root: {}", path.display())]
    OutsideRoot { path: PathBuf },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
