//! Recursive project discovery.
//!
//! Walks a directory tree looking for marker files. Every directory is
//! scanned whether or not it is itself a project, so projects may nest.
//! Errors never abort a scan: unreadable directories and malformed marker
//! files are logged and skipped.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::project::{MarkerContents, Project, ProjectConfig, project_id};

/// Discover all projects below `root`.
///
/// Results are depth-first with siblings visited in file-name order, so the
/// output is stable for a given filesystem state.
pub fn discover(root: &Path, options: &ScanConfig) -> Vec<Project> {
    let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
    let mut projects = Vec::new();
    scan_dir(&root, 0, options, &mut projects);
    debug!(root = %root.display(), count = projects.len(), "Discovery finished");
    projects
}

fn scan_dir(dir: &Path, depth: usize, options: &ScanConfig, out: &mut Vec<Project>) {
    if depth > options.max_depth {
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
            return;
        }
    };

    match read_marker(dir, &options.marker_file) {
        Ok(Some(configs)) => {
            out.extend(configs.into_iter().map(|config| Project::new(dir, config)));
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Skipping project configuration"),
    }

    let mut subdirs: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter(|entry| !is_skipped_dir(&entry.file_name(), options))
        .map(|entry| entry.path())
        .collect();
    subdirs.sort();

    for subdir in subdirs {
        scan_dir(&subdir, depth + 1, options, out);
    }
}

/// Names are compared as raw bytes so non-UTF-8 directories are still walked.
fn is_skipped_dir(name: &OsStr, options: &ScanConfig) -> bool {
    name.as_encoded_bytes().starts_with(b".")
        || options
            .ignored_dirs
            .iter()
            .any(|ignored| name == OsStr::new(ignored))
}

/// Read and validate the marker file in `dir`.
///
/// Returns `Ok(None)` when the directory has no marker file.
pub fn read_marker(dir: &Path, marker_file: &str) -> Result<Option<Vec<ProjectConfig>>> {
    let path = dir.join(marker_file);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::InvalidMarker {
                path,
                reason: e.to_string(),
            });
        }
    };

    let configs = serde_json::from_str::<MarkerContents>(&content)
        .map_err(|e| Error::InvalidMarker {
            path: path.clone(),
            reason: e.to_string(),
        })?
        .into_configs();

    for config in &configs {
        config
            .validate()
            .map_err(|reason| Error::InvalidMarker {
                path: path.clone(),
                reason,
            })?;
    }

    Ok(Some(configs))
}

/// Re-derive a single project from its directory and id.
///
/// `path` must lie inside `root`; the marker file in `path` is read fresh
/// and the config whose computed id equals `id` is returned.
pub fn resolve_project(root: &Path, path: &Path, id: &str, marker_file: &str) -> Result<Project> {
    ensure_within_root(root, path)?;

    let configs = read_marker(path, marker_file)?.ok_or_else(|| Error::ProjectNotFound {
        id: id.to_string(),
    })?;

    configs
        .into_iter()
        .find(|config| project_id(path, &config.name) == id)
        .map(|config| Project::new(path, config))
        .ok_or_else(|| Error::ProjectNotFound { id: id.to_string() })
}

fn ensure_within_root(root: &Path, path: &Path) -> Result<()> {
    let outside = || Error::OutsideRoot {
        path: path.to_path_buf(),
    };
    let root = root.canonicalize()?;
    let path = path.canonicalize().map_err(|_| outside())?;
    if path.starts_with(&root) {
        Ok(())
    } else {
        Err(outside())
    }
}
