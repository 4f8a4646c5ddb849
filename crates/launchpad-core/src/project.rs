//! Project data model.
//!
//! A [`ProjectConfig`] is what a project author writes into a marker file;
//! a [`Project`] is one such configuration bound to the directory it was
//! found in. Projects are rebuilt on every scan and never cached.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Separator between directory path and config name in a project id.
pub const ID_SEPARATOR: &str = "::";

/// One launchable configuration declared in a marker file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Display name, unique within its directory.
    pub name: String,
    /// Port the project listens on once started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Shell command used to start the project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ProjectConfig {
    /// Create a config with only a name set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port: None,
            start_command: None,
            color: None,
            category: None,
            tags: Vec::new(),
        }
    }

    /// The start command, if one is declared and not blank.
    pub fn command(&self) -> Option<&str> {
        self.start_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Check the fields the core relies on.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("`name` must be a non-empty string".to_string());
        }
        if self.port == Some(0) {
            return Err(format!("`port` of {:?} must be a positive integer", self.name));
        }
        Ok(())
    }
}

/// A marker file holds either a single config object or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum MarkerContents {
    Many(Vec<ProjectConfig>),
    One(ProjectConfig),
}

impl MarkerContents {
    pub(crate) fn into_configs(self) -> Vec<ProjectConfig> {
        match self {
            Self::Many(configs) => configs,
            Self::One(config) => vec![config],
        }
    }
}

/// A project configuration resolved to a concrete directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Deterministic identifier, `path::name`.
    pub id: String,
    /// Absolute directory containing the marker file.
    pub path: PathBuf,
    pub config: ProjectConfig,
}

impl Project {
    pub fn new(path: impl Into<PathBuf>, config: ProjectConfig) -> Self {
        let path = path.into();
        let id = project_id(&path, &config.name);
        Self { id, path, config }
    }

    pub fn port(&self) -> Option<u16> {
        self.config.port
    }
}

/// Compute the id of the config named `name` in directory `path`.
pub fn project_id(path: &Path, name: &str) -> String {
    format!("{}{ID_SEPARATOR}{name}", path.display())
}

/// Externally observable lifecycle state of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Running,
    Stopped,
}

impl ProjectStatus {
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project together with its status at the time of listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub status: ProjectStatus,
}
