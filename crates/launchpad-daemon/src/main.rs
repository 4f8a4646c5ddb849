//! `Launchpad`
//!
//! Discovers local projects marked by a `.launchpad` file, reports their
//! status, and starts or stops them with live output.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use launchpad_core::catalog::{CategoryFilter, categories, group_by_path};
use launchpad_core::config::{self, Config};
use launchpad_daemon::ProjectService;

#[derive(Parser, Debug)]
#[command(name = "launchpad")]
#[command(version, about = "Launchpad - discover and run local projects")]
struct Args {
    /// Directory scanned for projects (defaults to the current directory)
    #[arg(long, global = true, env = "LAUNCHPAD_ROOT")]
    root: Option<PathBuf>,

    /// Settings file overriding the global one
    #[arg(long, global = true, env = "LAUNCHPAD_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum directory depth scanned below the root
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, global = true, default_value = "info", env = "LAUNCHPAD_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true, env = "LAUNCHPAD_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered projects with their status
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Only show this category ("Uncategorized" for none)
        #[arg(long)]
        category: Option<String>,
    },
    /// List the distinct categories of discovered projects
    Categories,
    /// Start a project and stream its output until it exits or Ctrl+C
    Run {
        /// Project directory
        #[arg(long)]
        path: PathBuf,
        /// Project id (`<path>::<name>`)
        #[arg(long)]
        id: String,
    },
    /// Stop a project, killing whatever listens on its port
    Stop {
        /// Project directory
        #[arg(long)]
        path: PathBuf,
        /// Project id (`<path>::<name>`)
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("launchpad={0},launchpad_daemon={0},launchpad_core={0}", args.log_level);
    launchpad_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let config = resolve_config(&args)?;
    let root = config.scan.root_or_cwd()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        root = %root.display(),
        "Starting launchpad"
    );

    let service = ProjectService::new(root, &config);

    match args.command {
        Command::List { json, category } => list(&service, json, category.as_deref()).await,
        Command::Categories => {
            print_categories(&service).await;
            Ok(())
        }
        Command::Run { path, id } => run(&service, path, id).await,
        Command::Stop { path, id } => {
            service.stop(&path, &id).await;
            Ok(())
        }
    }
}

fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = config::load_config_file(path)?;
            config::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            config
        }
        None => config::load_config()?,
    };
    if let Some(root) = &args.root {
        config.scan.root = Some(root.clone());
    }
    if let Some(depth) = args.max_depth {
        config.scan.max_depth = depth;
    }
    config::validate(&config)?;
    Ok(config)
}

#[allow(clippy::print_stdout)]
async fn list(service: &ProjectService, json: bool, category: Option<&str>) -> anyhow::Result<()> {
    let filter = CategoryFilter::from(category);
    let views: Vec<_> = service
        .list()
        .await
        .into_iter()
        .filter(|view| filter.matches(&view.project))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    for group in group_by_path(views, |view| &view.project) {
        println!("{}", group.path.display());
        for view in group.items {
            let port = view
                .project
                .port()
                .map_or_else(|| "-".to_string(), |p| p.to_string());
            println!(
                "  {:<8} {:<24} port {:<6} {}",
                view.status,
                view.project.config.name,
                port,
                view.project.id
            );
        }
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn print_categories(service: &ProjectService) {
    let projects = service.discover().await;
    for category in categories(&projects) {
        println!("{category}");
    }
}

async fn run(service: &ProjectService, path: PathBuf, id: String) -> anyhow::Result<()> {
    let mut logs = service.subscribe(&id).await;
    let mut exits = service.supervisor().subscribe_exits();
    let project = service.start(&path, &id).await?;

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            chunk = logs.recv() => {
                let Some(chunk) = chunk else { break };
                stdout.write_all(chunk.data.as_bytes())?;
                stdout.flush()?;
            }
            event = exits.recv() => {
                match event {
                    Ok(event) if event.id == project.id => {
                        info!(project_id = %event.id, exit_code = ?event.exit_code, "Project exited");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Exit event stream interrupted");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping project");
                service.supervisor().stop(&project.id, project.port()).await;
                break;
            }
        }
    }

    while let Some(chunk) = logs.try_recv() {
        stdout.write_all(chunk.data.as_bytes())?;
    }
    stdout.flush()?;
    service.unsubscribe(logs).await;
    Ok(())
}
