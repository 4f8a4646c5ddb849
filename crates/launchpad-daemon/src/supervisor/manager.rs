//! Project process lifecycle manager.
//!
//! Spawns start commands, watches them for exit, and terminates their
//! process trees. Status combines the table of spawned processes with a
//! TCP probe of the project's port, so processes started elsewhere still
//! show up as running.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use launchpad_core::config::SupervisorConfig;
use launchpad_core::{Project, ProjectStatus};

use super::output::spawn_forwarder;
use super::terminate;
use super::types::{ExitEvent, RunningEntry, RunningProcess, SupervisorError};
use crate::bus::{LogBus, OutputStream};
use crate::probe::Prober;

/// How long to wait for output readers after the child exits.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How long to wait for exit after the forceful signal.
const KILL_WAIT: Duration = Duration::from_secs(2);

const EXIT_EVENT_CAPACITY: usize = 64;

type EntryTable = Arc<RwLock<HashMap<String, RunningEntry>>>;

/// Supervisor for project processes.
///
/// Owns the table of processes it spawned. Start and stop are serialised per
/// project id; status queries never wait on them.
pub struct Supervisor {
    entries: EntryTable,
    /// Per-id exclusive sections for start/stop.
    op_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    bus: LogBus,
    prober: Prober,
    exit_tx: broadcast::Sender<ExitEvent>,
    terminate_timeout: Duration,
    mirror_output: bool,
}

impl Supervisor {
    /// Create a supervisor publishing output to `bus`.
    pub fn new(bus: LogBus, config: &SupervisorConfig) -> Self {
        let (exit_tx, _) = broadcast::channel(EXIT_EVENT_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            op_locks: Mutex::new(HashMap::new()),
            bus,
            prober: Prober::new(config.probe_timeout()),
            exit_tx,
            terminate_timeout: config.terminate_timeout(),
            mirror_output: config.mirror_output,
        }
    }

    /// The bus captured output is published to.
    pub const fn bus(&self) -> &LogBus {
        &self.bus
    }

    /// Receive an [`ExitEvent`] for every supervised process that exits.
    pub fn subscribe_exits(&self) -> broadcast::Receiver<ExitEvent> {
        self.exit_tx.subscribe()
    }

    /// Current status of project `id`.
    ///
    /// Running if this supervisor spawned it and it has not exited, or else
    /// if `port` is given and accepts connections.
    pub async fn status(&self, id: &str, port: Option<u16>) -> ProjectStatus {
        let tracked = self
            .entries
            .read()
            .await
            .get(id)
            .is_some_and(RunningEntry::is_running);
        if tracked {
            return ProjectStatus::Running;
        }

        if let Some(port) = port
            && self.prober.is_port_open(port).await
        {
            return ProjectStatus::Running;
        }

        ProjectStatus::Stopped
    }

    /// Start `project`'s command.
    ///
    /// Returns once the process exists; readiness is not awaited.
    pub async fn start(&self, project: &Project) -> Result<(), SupervisorError> {
        let id = project.id.as_str();
        let command = project
            .config
            .command()
            .ok_or_else(|| SupervisorError::MissingCommand { id: id.to_string() })?;

        let lock = self.op_lock(id).await;
        let result = {
            let _guard = lock.lock().await;
            self.spawn_locked(project, command).await
        };
        self.release_op_lock(id, lock).await;
        result
    }

    async fn spawn_locked(&self, project: &Project, command: &str) -> Result<(), SupervisorError> {
        let id = project.id.as_str();
        if self.status(id, project.port()).await.is_running() {
            return Err(SupervisorError::AlreadyRunning { id: id.to_string() });
        }

        info!(
            project_id = id,
            path = %project.path.display(),
            command,
            "Starting project"
        );

        let mut child = shell_command(command)
            .current_dir(&project.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::SpawnFailed {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        let pid = child.id();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_forwarder(
                stdout,
                id.to_string(),
                OutputStream::Stdout,
                self.bus.clone(),
                self.mirror_output,
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_forwarder(
                stderr,
                id.to_string(),
                OutputStream::Stderr,
                self.bus.clone(),
                self.mirror_output,
            ));
        }

        let (exited_tx, exited_rx) = watch::channel(false);
        let (kill_tx, kill_rx) = mpsc::channel(1);
        let run_id = uuid::Uuid::new_v4();

        self.entries.write().await.insert(
            id.to_string(),
            RunningEntry {
                id: id.to_string(),
                run_id,
                pid,
                started_at: SystemTime::now(),
                exited: exited_rx,
                kill_tx,
            },
        );

        tokio::spawn(watch_exit(ExitWatch {
            id: id.to_string(),
            run_id,
            child,
            readers,
            kill_rx,
            exited_tx,
            entries: Arc::clone(&self.entries),
            exit_tx: self.exit_tx.clone(),
        }));

        info!(project_id = id, ?pid, "Project started");
        Ok(())
    }

    /// Stop project `id`. Never fails.
    ///
    /// Terminates the process tree this supervisor spawned for `id`, if any,
    /// then, when `port` is given, kills whatever still listens on it.
    pub async fn stop(&self, id: &str, port: Option<u16>) {
        let lock = self.op_lock(id).await;
        {
            let _guard = lock.lock().await;
            self.stop_locked(id, port).await;
        }
        self.release_op_lock(id, lock).await;
    }

    async fn stop_locked(&self, id: &str, port: Option<u16>) {
        let tracked = self.entries.read().await.get(id).map(|entry| {
            (
                entry.run_id,
                entry.pid,
                entry.exited.clone(),
                entry.kill_tx.clone(),
            )
        });

        if let Some((run_id, pid, exited, kill_tx)) = tracked {
            info!(project_id = id, ?pid, "Stopping project");
            self.terminate(id, pid, exited, &kill_tx).await;
            remove_entry(&self.entries, id, run_id).await;
        } else {
            debug!(project_id = id, "No supervised process to stop");
        }

        if let Some(port) = port {
            terminate::kill_port_listeners(port).await;
        }
    }

    /// Stop every process this supervisor spawned.
    pub async fn stop_all(&self) {
        for id in self.running_ids().await {
            self.stop(&id, None).await;
        }
    }

    /// Ids of spawned processes that have not exited.
    pub async fn running_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_running())
            .map(|entry| entry.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Details of the process spawned for `id`, if it is still tracked.
    pub async fn running_entry(&self, id: &str) -> Option<RunningProcess> {
        self.entries.read().await.get(id).map(RunningEntry::snapshot)
    }

    async fn op_lock(&self, id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.op_locks.lock().await.entry(id.to_string()).or_default())
    }

    /// Drop the lock for `id` once no other operation holds or awaits it.
    async fn release_op_lock(&self, id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.op_locks.lock().await;
        drop(lock);
        if locks.get(id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(id);
        }
    }

    /// Graceful-then-forceful termination of the process group.
    ///
    /// Waits for every process in the group, not only the shell, so a
    /// descendant that ignores SIGTERM still gets SIGKILL.
    #[cfg(unix)]
    async fn terminate(
        &self,
        id: &str,
        pid: Option<u32>,
        exited: watch::Receiver<bool>,
        kill_tx: &mpsc::Sender<()>,
    ) {
        let Some(pid) = pid else {
            force_kill(id, exited, kill_tx).await;
            return;
        };

        if terminate::group_alive(pid) {
            if let Err(e) = terminate::signal_group(pid, libc::SIGTERM) {
                warn!(project_id = id, pid, error = %e, "Failed to send SIGTERM");
            }

            if terminate::wait_group_exit(pid, self.terminate_timeout).await {
                info!(project_id = id, "Project exited gracefully");
            } else {
                warn!(project_id = id, "Grace period expired, sending SIGKILL");
                if let Err(e) = terminate::signal_group(pid, libc::SIGKILL) {
                    warn!(project_id = id, pid, error = %e, "Failed to send SIGKILL");
                }
                let _ = kill_tx.try_send(());
                if !terminate::wait_group_exit(pid, KILL_WAIT).await {
                    warn!(project_id = id, pid, "Process group still alive after SIGKILL");
                }
            }
        }

        wait_exited(id, exited).await;
    }

    #[cfg(not(unix))]
    async fn terminate(
        &self,
        id: &str,
        _pid: Option<u32>,
        exited: watch::Receiver<bool>,
        kill_tx: &mpsc::Sender<()>,
    ) {
        force_kill(id, exited, kill_tx).await;
    }
}

/// Ask the exit watcher to kill the child and wait for it to be reaped.
async fn force_kill(id: &str, exited: watch::Receiver<bool>, kill_tx: &mpsc::Sender<()>) {
    if *exited.borrow() {
        return;
    }
    let _ = kill_tx.try_send(());
    wait_exited(id, exited).await;
}

async fn wait_exited(id: &str, mut exited: watch::Receiver<bool>) {
    let observed = tokio::time::timeout(KILL_WAIT, exited.wait_for(|&done| done))
        .await
        .is_ok_and(|r| r.is_ok());
    if !observed {
        warn!(project_id = id, "Process exit not observed after kill");
    }
}

/// Everything the exit watcher task owns.
struct ExitWatch {
    id: String,
    run_id: uuid::Uuid,
    child: Child,
    readers: Vec<JoinHandle<()>>,
    kill_rx: mpsc::Receiver<()>,
    exited_tx: watch::Sender<bool>,
    entries: EntryTable,
    exit_tx: broadcast::Sender<ExitEvent>,
}

async fn watch_exit(ctx: ExitWatch) {
    let ExitWatch {
        id,
        run_id,
        mut child,
        readers,
        mut kill_rx,
        exited_tx,
        entries,
        exit_tx,
    } = ctx;

    let status = tokio::select! {
        status = child.wait() => status,
        Some(()) = kill_rx.recv() => {
            if let Err(e) = child.start_kill() {
                warn!(project_id = %id, error = %e, "Failed to kill child");
            }
            child.wait().await
        }
    };
    let _ = exited_tx.send(true);

    let exit_code = match &status {
        Ok(status) => {
            info!(project_id = %id, ?status, "Project exited");
            status.code()
        }
        Err(e) => {
            warn!(project_id = %id, error = %e, "Failed to wait for project");
            None
        }
    };

    for reader in readers {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
            debug!(project_id = %id, "Output still open after exit, not waiting");
        }
    }

    remove_entry(&entries, &id, run_id).await;
    let _ = exit_tx.send(ExitEvent { id, exit_code });
}

/// Remove the entry for `id` if it still belongs to run `run_id`.
async fn remove_entry(entries: &RwLock<HashMap<String, RunningEntry>>, id: &str, run_id: uuid::Uuid) {
    let mut entries = entries.write().await;
    if entries.get(id).is_some_and(|entry| entry.run_id == run_id) {
        entries.remove(id);
    }
}

/// Build a shell invocation of `command`, leading its own process group.
fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).process_group(0);
        cmd
    }
    #[cfg(not(unix))]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
}
