#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity
#![cfg(unix)]

//! End-to-end lifecycle tests against real shell processes.
//!
//! Covers the paths a front end drives: start with live output, natural
//! exit, stop with the graceful/forceful sequence, port-based status and
//! double-start rejection.

use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use launchpad_core::config::SupervisorConfig;
use launchpad_core::{Config, Project, ProjectConfig, ProjectStatus};
use launchpad_daemon::bus::LogBus;
use launchpad_daemon::supervisor::terminate;
use launchpad_daemon::{ExitEvent, ProjectService, Supervisor, SupervisorError};

const EXIT_WAIT: Duration = Duration::from_secs(15);

fn init() {
    launchpad_core::tracing_init::try_init_tracing("launchpad_daemon=debug");
}

fn supervisor() -> Supervisor {
    let config = SupervisorConfig {
        terminate_timeout_secs: 2,
        mirror_output: false,
        ..SupervisorConfig::default()
    };
    Supervisor::new(LogBus::default(), &config)
}

fn project(dir: &Path, name: &str, command: &str, port: Option<u16>) -> Project {
    let mut config = ProjectConfig::named(name);
    config.start_command = Some(command.to_string());
    config.port = port;
    Project::new(dir, config)
}

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn tool_available(tool: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {tool}"))
        .output()
        .is_ok_and(|out| out.status.success())
}

async fn wait_for_exit(exits: &mut broadcast::Receiver<ExitEvent>, id: &str) -> ExitEvent {
    tokio::time::timeout(EXIT_WAIT, async {
        loop {
            let event = exits.recv().await.unwrap();
            if event.id == id {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_output_reaches_early_subscriber_and_status_follows_exit() {
    init();
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = supervisor();
    let project = project(dir.path(), "web", "sleep 2 && echo done", None);

    let mut logs = supervisor.bus().subscribe(&project.id).await;
    let mut exits = supervisor.subscribe_exits();

    supervisor.start(&project).await.unwrap();
    assert_eq!(supervisor.status(&project.id, None).await, ProjectStatus::Running);
    assert_eq!(supervisor.running_ids().await, vec![project.id.clone()]);

    let event = wait_for_exit(&mut exits, &project.id).await;
    assert_eq!(event.exit_code, Some(0));
    assert_eq!(supervisor.status(&project.id, None).await, ProjectStatus::Stopped);
    assert!(supervisor.running_entry(&project.id).await.is_none());

    let mut output = String::new();
    while let Some(chunk) = logs.try_recv() {
        output.push_str(&chunk.data);
    }
    assert_eq!(output, "done\n");
}

#[tokio::test]
async fn test_stderr_is_captured_separately() {
    init();
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = supervisor();
    let project = project(dir.path(), "noisy", "echo oops 1>&2", None);

    let mut logs = supervisor.bus().subscribe(&project.id).await;
    let mut exits = supervisor.subscribe_exits();
    supervisor.start(&project).await.unwrap();
    wait_for_exit(&mut exits, &project.id).await;

    let chunk = logs.try_recv().unwrap();
    assert_eq!(chunk.stream, launchpad_daemon::OutputStream::Stderr);
    assert_eq!(chunk.data, "oops\n");
}

#[tokio::test]
async fn test_exit_code_is_reported() {
    init();
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = supervisor();
    let project = project(dir.path(), "fails", "exit 3", None);

    let mut exits = supervisor.subscribe_exits();
    supervisor.start(&project).await.unwrap();

    let event = wait_for_exit(&mut exits, &project.id).await;
    assert_eq!(event.exit_code, Some(3));
    assert_eq!(supervisor.status(&project.id, None).await, ProjectStatus::Stopped);
}

#[tokio::test]
async fn test_command_runs_in_project_directory() {
    init();
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "here\n").unwrap();
    let supervisor = supervisor();
    let project = project(dir.path(), "cwd", "cat marker.txt", None);

    let mut logs = supervisor.bus().subscribe(&project.id).await;
    let mut exits = supervisor.subscribe_exits();
    supervisor.start(&project).await.unwrap();
    wait_for_exit(&mut exits, &project.id).await;

    assert_eq!(logs.try_recv().unwrap().data, "here\n");
}

#[tokio::test]
async fn test_stop_terminates_and_is_idempotent() {
    init();
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = supervisor();
    let project = project(dir.path(), "sleeper", "sleep 30", None);

    let mut exits = supervisor.subscribe_exits();
    supervisor.start(&project).await.unwrap();
    let pid = supervisor.running_entry(&project.id).await.unwrap().pid;
    assert!(pid.is_some());

    tokio::time::timeout(EXIT_WAIT, supervisor.stop(&project.id, None))
        .await
        .unwrap();
    assert_eq!(supervisor.status(&project.id, None).await, ProjectStatus::Stopped);
    let event = wait_for_exit(&mut exits, &project.id).await;
    assert_ne!(event.exit_code, Some(0));

    supervisor.stop(&project.id, None).await;
    assert_eq!(supervisor.status(&project.id, None).await, ProjectStatus::Stopped);
}

#[tokio::test]
async fn test_stop_escalates_when_term_is_ignored() {
    init();
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = supervisor();
    let project = project(
        dir.path(),
        "stubborn",
        "trap '' TERM; while true; do sleep 1; done",
        None,
    );

    let mut exits = supervisor.subscribe_exits();
    supervisor.start(&project).await.unwrap();
    // Let the shell install its trap before signalling.
    tokio::time::sleep(Duration::from_millis(300)).await;

    tokio::time::timeout(EXIT_WAIT, supervisor.stop(&project.id, None))
        .await
        .unwrap();
    wait_for_exit(&mut exits, &project.id).await;
    assert_eq!(supervisor.status(&project.id, None).await, ProjectStatus::Stopped);
}

#[tokio::test]
async fn test_stop_kills_descendants_that_ignore_term() {
    init();
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = supervisor();
    let project = project(
        dir.path(),
        "tree",
        "(trap '' TERM; while true; do sleep 1; done) & wait",
        None,
    );

    supervisor.start(&project).await.unwrap();
    let pid = supervisor.running_entry(&project.id).await.unwrap().pid.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(terminate::group_alive(pid));

    tokio::time::timeout(EXIT_WAIT, supervisor.stop(&project.id, None))
        .await
        .unwrap();
    assert!(!terminate::group_alive(pid));
    assert_eq!(supervisor.status(&project.id, None).await, ProjectStatus::Stopped);
}

#[tokio::test]
async fn test_stop_falls_back_to_port_listener() {
    init();
    if !tool_available("lsof") || !tool_available("python3") {
        return;
    }
    let port = free_port().await;
    let script = format!(
        "import socket, time\n\
         s = socket.socket()\n\
         s.setsockopt(socket.SOL_SOCKET, socket.SO_REUSEADDR, 1)\n\
         s.bind(('127.0.0.1', {port}))\n\
         s.listen()\n\
         time.sleep(60)\n"
    );
    let mut listener = tokio::process::Command::new("python3")
        .arg("-c")
        .arg(script)
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let supervisor = supervisor();
    let id = "/elsewhere::external";
    tokio::time::timeout(EXIT_WAIT, async {
        while supervisor.status(id, Some(port)).await != ProjectStatus::Running {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();

    supervisor.stop(id, Some(port)).await;

    let status = tokio::time::timeout(EXIT_WAIT, listener.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.signal(), Some(9));
    assert_eq!(supervisor.status(id, Some(port)).await, ProjectStatus::Stopped);
}

#[tokio::test]
async fn test_project_can_restart_after_exit() {
    init();
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = supervisor();
    let project = project(dir.path(), "again", "true", None);

    let mut exits = supervisor.subscribe_exits();
    supervisor.start(&project).await.unwrap();
    wait_for_exit(&mut exits, &project.id).await;

    supervisor.start(&project).await.unwrap();
    wait_for_exit(&mut exits, &project.id).await;
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    init();
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = supervisor();
    let project = project(dir.path(), "once", "sleep 30", None);

    supervisor.start(&project).await.unwrap();
    let err = supervisor.start(&project).await.unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyRunning { .. }));

    supervisor.stop_all().await;
    assert!(supervisor.running_ids().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_starts_spawn_once() {
    init();
    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = Arc::new(supervisor());
    let project = project(dir.path(), "race", "sleep 30", None);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let supervisor = Arc::clone(&supervisor);
        let project = project.clone();
        handles.push(tokio::spawn(async move { supervisor.start(&project).await }));
    }

    let mut started = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => started += 1,
            Err(e) => assert!(matches!(e, SupervisorError::AlreadyRunning { .. })),
        }
    }
    assert_eq!(started, 1);

    supervisor.stop_all().await;
}

#[tokio::test]
async fn test_start_rejected_when_port_already_listening() {
    init();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let dir = tempfile::TempDir::new().unwrap();
    let supervisor = supervisor();
    let project = project(dir.path(), "taken", "sleep 30", Some(port));

    let err = supervisor.start(&project).await.unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyRunning { .. }));
    assert!(supervisor.running_entry(&project.id).await.is_none());
}

#[tokio::test]
async fn test_status_uses_port_probe_for_untracked_ids() {
    init();
    let supervisor = supervisor();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    assert_eq!(
        supervisor.status("/anywhere::external", Some(port)).await,
        ProjectStatus::Running
    );

    let free = free_port().await;
    assert_eq!(
        supervisor.status("/anywhere::external", Some(free)).await,
        ProjectStatus::Stopped
    );
    assert_eq!(
        supervisor.status("/anywhere::external", None).await,
        ProjectStatus::Stopped
    );
}

#[tokio::test]
async fn test_service_runs_project_from_marker() {
    init();
    let dir = tempfile::TempDir::new().unwrap();
    let project_dir = dir.path().join("app");
    std::fs::create_dir_all(&project_dir).unwrap();
    std::fs::write(
        project_dir.join(".launchpad"),
        r#"[{"name":"api","startCommand":"sleep 30"},{"name":"docs"}]"#,
    )
    .unwrap();

    let mut config = Config::default();
    config.supervisor.terminate_timeout_secs = 2;
    config.supervisor.mirror_output = false;
    let service = ProjectService::new(dir.path(), &config);

    let views = service.list().await;
    assert_eq!(views.len(), 2);
    let api = views[0].project.clone();
    let docs = views[1].project.clone();

    service.start(&api.path, &api.id).await.unwrap();
    assert_eq!(
        service.status(&api.path, &api.id).await.unwrap(),
        ProjectStatus::Running
    );

    let err = service.start(&docs.path, &docs.id).await.unwrap_err();
    assert!(matches!(
        err,
        launchpad_daemon::ServiceError::Supervisor(SupervisorError::MissingCommand { .. })
    ));

    tokio::time::timeout(EXIT_WAIT, service.stop(&api.path, &api.id))
        .await
        .unwrap();
    assert_eq!(
        service.status(&api.path, &api.id).await.unwrap(),
        ProjectStatus::Stopped
    );
}
