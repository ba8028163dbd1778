//! Adjutant CLI entry point

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use adjutant::cli::{Cli, Command};
use adjutant::config::Config;
use adjutant::daemon::DaemonManager;
use adjutant::dispatch::{Dispatcher, TaskRunner};
use adjutant::events::EventRouter;
use adjutant::exec::{ShellRunner, TIMEOUT_EXIT_CODE};
use adjutant::ledger::TokenLedger;
use adjutant::manifest::{Manifest, ManifestStore};
use adjutant::model::ModelFabric;
use adjutant::router::Router;
use adjutant::runtime::DaemonRuntime;
use adjutant::sched::SchedulerTick;
use adjutant::watchers::build_watchers;
use adjutant::CapabilityRegistry;

use taskstore::{Schedule, ScheduledTask, TaskOrigin, TaskStore};

fn setup_logging(verbose: bool) {
    let default_level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();
}

/// Load the manifest, keeping it in sync with the live capabilities;
/// generate one on first boot.
async fn load_manifest(
    store: &ManifestStore,
    fabric: &ModelFabric,
    registry: &CapabilityRegistry,
) -> Result<Manifest> {
    match store.load() {
        Some(mut manifest) => {
            if store.is_stale(&manifest, registry) {
                info!("Manifest is stale, syncing new capabilities");
                store.sync(&mut manifest, registry)?;
            }
            Ok(manifest)
        }
        None => store.generate(fabric, registry).await,
    }
}

struct App {
    dispatcher: Arc<Dispatcher>,
    fabric: Arc<ModelFabric>,
    ledger: Arc<TokenLedger>,
}

impl App {
    async fn build(config: Config) -> Result<Self> {
        let ledger = Arc::new(TokenLedger::with_checkpoint(config.ledger.path.clone()));
        let fabric = Arc::new(ModelFabric::from_config(&config.model, ledger.clone()));
        let registry = Arc::new(CapabilityRegistry::with_builtins());

        let manifest_store = ManifestStore::new(config.router.manifest_path.clone());
        let manifest = load_manifest(&manifest_store, &fabric, &registry).await.ok();

        let runner = ShellRunner::new(
            Duration::from_secs(config.exec.command_timeout_secs),
            std::env::current_dir().unwrap_or_else(|_| "/".into()),
        );
        let router = Router::new(manifest)
            .with_registry(registry.clone())
            .with_fabric(fabric.clone());
        let dispatcher = Arc::new(Dispatcher::new(router, Some(fabric.clone()), registry.clone(), runner));

        Ok(Self {
            dispatcher,
            fabric,
            ledger,
        })
    }
}

async fn cmd_route(app: &App, input: &str) -> Result<()> {
    let route = app.dispatcher.route(input).await;
    println!("{}", serde_json::to_string_pretty(&route)?);
    Ok(())
}

async fn cmd_run(app: &App, input: &str) -> Result<i32> {
    let answer = app.dispatcher.run_task(input).await?;
    println!("{answer}");
    app.ledger.flush();
    // Propagate the shell tool's timeout marker as exit 124
    if answer.contains("[timeout]") {
        return Ok(TIMEOUT_EXIT_CODE);
    }
    Ok(0)
}

fn cmd_schedule(config: &Config, task: String, every: Option<u64>, cron: Option<String>) -> Result<()> {
    let schedule = match (every, cron) {
        (Some(secs), _) => Schedule::Every { secs },
        (None, Some(expr)) => Schedule::Cron { expr },
        (None, None) => Schedule::OnceAt { at: chrono::Utc::now() },
    };

    let task = ScheduledTask::new(task, schedule, TaskOrigin::User)
        .ok_or_else(|| eyre::eyre!("schedule can never fire; check the cron expression"))?;
    let store = TaskStore::new(config.scheduler.tasks_path.clone());
    println!("scheduled {} for {}", task.id, task.next_run_at);
    store.add(task)?;
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    let manager = DaemonManager::new();
    let status = manager.status();

    if status.running {
        println!(
            "daemon: running (pid {}, version {})",
            status.pid.unwrap_or(0),
            status.version.as_deref().unwrap_or("unknown")
        );
    } else {
        println!("daemon: stopped");
    }

    let store = TaskStore::new(config.scheduler.tasks_path.clone());
    let tasks = store.load().unwrap_or_default();
    println!("tasks: {} total, {} pending", tasks.len(), tasks.iter().filter(|t| t.is_due(chrono::Utc::now())).count());
    Ok(())
}

async fn cmd_run_daemon(config: Config) -> Result<()> {
    let manager = DaemonManager::new();
    manager.register_self()?;

    let app = App::build(config.clone()).await?;
    let store = Arc::new(TaskStore::new(config.scheduler.tasks_path.clone()));
    let runner: Arc<dyn TaskRunner> = app.dispatcher.clone();

    let watchers = build_watchers(&config.listener);
    let event_router = EventRouter::new(Some(app.fabric.clone()), store.clone(), runner.clone());
    let scheduler = SchedulerTick::new(config.scheduler.clone(), store, runner);

    let runtime = DaemonRuntime::new(config, watchers, event_router, scheduler, app.ledger.clone());
    runtime.run().await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let exit_code = match cli.command {
        Some(Command::Start { foreground }) => {
            if foreground {
                cmd_run_daemon(config).await?;
            } else {
                let manager = DaemonManager::new();
                let pid = manager.start()?;
                println!("daemon started (pid {pid})");
            }
            0
        }
        Some(Command::Stop) => {
            DaemonManager::new().stop()?;
            println!("daemon stopped");
            0
        }
        Some(Command::Status) | None => {
            cmd_status(&config)?;
            0
        }
        Some(Command::Route { input }) => {
            let app = App::build(config).await?;
            cmd_route(&app, &input).await?;
            0
        }
        Some(Command::Run { input }) => {
            let app = App::build(config).await?;
            cmd_run(&app, &input).await?
        }
        Some(Command::Schedule { task, every, cron }) => {
            cmd_schedule(&config, task, every, cron)?;
            0
        }
        Some(Command::RunDaemon) => {
            cmd_run_daemon(config).await?;
            0
        }
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
