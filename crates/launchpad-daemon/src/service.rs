//! Project operations addressed by `(path, id)`.
//!
//! Collaborators such as an HTTP or websocket front end only hold the path
//! and id of a project. Every operation here re-derives the project from a
//! fresh read of its marker file before touching the supervisor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use launchpad_core::config::ScanConfig;
use launchpad_core::{Config, Project, ProjectStatus, ProjectView, discover, resolve_project};

use crate::bus::{LogBus, Subscription};
use crate::supervisor::{Supervisor, SupervisorError};

/// Errors from project operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Project(#[from] launchpad_core::Error),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Discovery plus supervision rooted at one directory.
pub struct ProjectService {
    root: PathBuf,
    scan: ScanConfig,
    supervisor: Arc<Supervisor>,
}

impl ProjectService {
    /// Build the service and its supervisor and bus from `config`.
    pub fn new(root: impl Into<PathBuf>, config: &Config) -> Self {
        let bus = LogBus::new(&config.bus);
        let supervisor = Arc::new(Supervisor::new(bus, &config.supervisor));
        Self::with_supervisor(root, config.scan.clone(), supervisor)
    }

    pub fn with_supervisor(
        root: impl Into<PathBuf>,
        scan: ScanConfig,
        supervisor: Arc<Supervisor>,
    ) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self {
            root,
            scan,
            supervisor,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub const fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    pub fn bus(&self) -> &LogBus {
        self.supervisor.bus()
    }

    /// Run a fresh discovery scan.
    pub async fn discover(&self) -> Vec<Project> {
        let root = self.root.clone();
        let scan = self.scan.clone();
        match tokio::task::spawn_blocking(move || discover(&root, &scan)).await {
            Ok(projects) => projects,
            Err(e) => {
                warn!(error = %e, "Discovery task failed");
                Vec::new()
            }
        }
    }

    /// Discover projects and compute each one's status.
    ///
    /// Port probes run concurrently; output keeps discovery order.
    pub async fn list(&self) -> Vec<ProjectView> {
        let projects = self.discover().await;

        let mut probes = JoinSet::new();
        for (index, project) in projects.iter().enumerate() {
            let supervisor = Arc::clone(&self.supervisor);
            let id = project.id.clone();
            let port = project.port();
            probes.spawn(async move { (index, supervisor.status(&id, port).await) });
        }

        let mut statuses = vec![ProjectStatus::Stopped; projects.len()];
        while let Some(result) = probes.join_next().await {
            match result {
                Ok((index, status)) => statuses[index] = status,
                Err(e) => warn!(error = %e, "Status probe failed"),
            }
        }

        projects
            .into_iter()
            .zip(statuses)
            .map(|(project, status)| ProjectView { project, status })
            .collect()
    }

    /// Re-derive the project `id` from the marker file in `path`.
    pub async fn resolve(&self, path: &Path, id: &str) -> Result<Project, ServiceError> {
        let root = self.root.clone();
        let path = path.to_path_buf();
        let id = id.to_string();
        let marker = self.scan.marker_file.clone();
        let resolved = tokio::task::spawn_blocking(move || resolve_project(&root, &path, &id, &marker))
            .await
            .map_err(|e| launchpad_core::Error::Io(std::io::Error::other(e)))?;
        Ok(resolved?)
    }

    /// Start project `id` found in `path`.
    pub async fn start(&self, path: &Path, id: &str) -> Result<Project, ServiceError> {
        let project = self.resolve(path, id).await?;
        self.supervisor.start(&project).await?;
        Ok(project)
    }

    /// Stop project `id` found in `path`. Never fails.
    ///
    /// The port fallback is used when the marker file still declares one.
    pub async fn stop(&self, path: &Path, id: &str) {
        let port = match self.resolve(path, id).await {
            Ok(project) => project.port(),
            Err(e) => {
                warn!(project_id = id, error = %e, "Could not read config for stopping");
                None
            }
        };
        self.supervisor.stop(id, port).await;
        info!(project_id = id, "Stop completed");
    }

    /// Status of project `id` found in `path`.
    pub async fn status(&self, path: &Path, id: &str) -> Result<ProjectStatus, ServiceError> {
        let project = self.resolve(path, id).await?;
        Ok(self.supervisor.status(&project.id, project.port()).await)
    }

    /// Live output of project `id`.
    pub async fn subscribe(&self, id: &str) -> Subscription {
        self.bus().subscribe(id).await
    }

    pub async fn unsubscribe(&self, subscription: Subscription) {
        self.bus().unsubscribe(subscription).await;
    }
}
