//! Configuration resolution for Launchpad.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/launchpad/settings.json)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default name of the per-directory marker file.
pub const DEFAULT_MARKER_FILE: &str = ".launchpad";

/// Complete Launchpad configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

/// Discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory to scan. Falls back to the current directory when unset.
    pub root: Option<PathBuf>,
    /// Deepest directory level (root is 0) still inspected.
    pub max_depth: usize,
    /// Marker file name looked up in every directory.
    pub marker_file: String,
    /// Directory names never descended into, besides hidden ones.
    pub ignored_dirs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_depth: 5,
            marker_file: DEFAULT_MARKER_FILE.to_string(),
            ignored_dirs: vec!["node_modules".to_string()],
        }
    }
}

impl ScanConfig {
    /// The configured root, or the current directory.
    pub fn root_or_cwd(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

/// Process supervisor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Upper bound for a single TCP liveness probe.
    pub probe_timeout_ms: u64,
    /// Grace period between SIGTERM and SIGKILL when stopping.
    pub terminate_timeout_secs: u64,
    /// Mirror captured child output into the supervisor's own log.
    pub mirror_output: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 500,
            terminate_timeout_secs: 5,
            mirror_output: true,
        }
    }
}

impl SupervisorConfig {
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub const fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }
}

/// Log bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Per-project broadcast channel capacity. Subscribers that fall further
    /// behind than this lose the oldest chunks.
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config() -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        config = load_config_file(&global_path)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .map(|p| p.join("launchpad").join("settings.json"))
}

/// Read a config file. Missing sections and fields take their defaults.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply `LAUNCHPAD_*` overrides, reading variables through `lookup`.
///
/// Unparseable numeric or boolean values are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("LAUNCHPAD_ROOT") {
        config.scan.root = Some(PathBuf::from(val));
    }
    if let Some(n) = lookup("LAUNCHPAD_MAX_DEPTH").and_then(|v| v.parse().ok()) {
        config.scan.max_depth = n;
    }
    if let Some(n) = lookup("LAUNCHPAD_PROBE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.supervisor.probe_timeout_ms = n;
    }
    if let Some(n) = lookup("LAUNCHPAD_TERMINATE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.supervisor.terminate_timeout_secs = n;
    }
    if let Some(b) = lookup("LAUNCHPAD_MIRROR_OUTPUT").and_then(|v| v.parse().ok()) {
        config.supervisor.mirror_output = b;
    }
}

/// Reject settings the runtime cannot work with.
pub fn validate(config: &Config) -> Result<()> {
    if config.scan.marker_file.trim().is_empty() {
        return Err(Error::Config("scan.marker_file must not be empty".to_string()));
    }
    if config.supervisor.probe_timeout_ms == 0 {
        return Err(Error::Config(
            "supervisor.probe_timeout_ms must be positive".to_string(),
        ));
    }
    if config.bus.channel_capacity == 0 {
        return Err(Error::Config(
            "bus.channel_capacity must be positive".to_string(),
        ));
    }
    Ok(())
}
