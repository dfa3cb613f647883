//! # BGTasks: Chained Background Task Runner
//!
//! Runs the refresh job and the processing chain on a local host scheduler,
//! records every run to the event log and reports it to the telemetry backend.
//!
//! Usage:
//!   bgtasks run                          # Launch and keep the chain armed
//!   bgtasks run --arm-refresh            # Also arm the refresh job at launch
//!   bgtasks events list                  # Print the event log
//!   bgtasks device token <hex>           # Register a push token

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bgtasks_core::config::BgTasksConfig;
use bgtasks_core::traits::{BackgroundScheduler, KeyValueStore, TelemetrySink};
use bgtasks_core::types::{JobIds, NotificationStatus};
use bgtasks_scheduler::{
    Collaborators, EventLog, FileKvStore, HostDeviceInfo, HttpTelemetry, LocalScheduler,
    NoopTelemetry, RunOrchestrator, device, probe_target, spawn_connectivity_probe, spawn_host,
};

#[derive(Parser)]
#[command(
    name = "bgtasks",
    version,
    about = "⏱️ BGTasks — chained background task runner"
)]
struct Cli {
    /// Config file (defaults to ~/.bgtasks/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch the orchestrator on the local host scheduler
    Run {
        /// Arm the refresh job at launch
        #[arg(long)]
        arm_refresh: bool,

        /// Treat the host as running on battery (holds processing jobs)
        #[arg(long)]
        on_battery: bool,

        /// Exit after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        for_secs: Option<u64>,
    },
    /// Inspect or edit the event log
    Events {
        #[command(subcommand)]
        action: EventsAction,
    },
    /// Device identity and registration
    Device {
        #[command(subcommand)]
        action: DeviceAction,
    },
}

#[derive(Subcommand)]
enum EventsAction {
    /// Print every stored record
    List,
    /// Delete the log file
    Clear,
    /// Append a "begin-idle" marker
    BeginIdle,
    /// Append an "end-idle" marker
    EndIdle,
    /// Print the log file path
    Path,
}

#[derive(Subcommand)]
enum DeviceAction {
    /// Print the device identifier
    Id,
    /// Register a push token (hex)
    Token { token: String },
    /// Report notification authorization
    Notifications { status: NotificationStatus },
}

fn load_config(path: Option<&str>) -> Result<BgTasksConfig> {
    let config = match path {
        Some(p) => {
            let p = PathBuf::from(shellexpand::tilde(p).to_string());
            BgTasksConfig::load_from(&p)?
        }
        None => BgTasksConfig::load()?,
    };
    Ok(config)
}

struct App {
    config: BgTasksConfig,
    ids: JobIds,
    store: Arc<FileKvStore>,
    event_log: Arc<EventLog>,
}

impl App {
    fn new(config: BgTasksConfig) -> Result<Self> {
        let data_dir = config.data_path();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating {}", data_dir.display()))?;
        Ok(Self {
            ids: JobIds::new(&config.tasks.namespace, config.tasks.max_processing_tasks),
            store: Arc::new(FileKvStore::open(&data_dir)),
            event_log: Arc::new(EventLog::new(&data_dir, &config.event_log.name)),
            config,
        })
    }

    fn telemetry(&self) -> Arc<dyn TelemetrySink> {
        if self.config.telemetry.enabled {
            Arc::new(HttpTelemetry::new(&self.config.telemetry))
        } else {
            tracing::info!("📴 Telemetry disabled");
            Arc::new(NoopTelemetry)
        }
    }

    fn orchestrator(&self, scheduler: Arc<dyn BackgroundScheduler>) -> Arc<RunOrchestrator> {
        RunOrchestrator::new(
            self.ids.clone(),
            Collaborators {
                scheduler,
                store: self.store.clone() as Arc<dyn KeyValueStore>,
                event_log: Arc::clone(&self.event_log),
                telemetry: self.telemetry(),
                device: Arc::new(HostDeviceInfo::detect()),
            },
        )
    }

    fn local_scheduler(&self) -> Arc<LocalScheduler> {
        Arc::new(LocalScheduler::new(self.ids.clone(), self.config.host.clone()))
    }
}

async fn run(app: App, arm_refresh: bool, on_battery: bool, for_secs: Option<u64>) -> Result<()> {
    let host = app.local_scheduler();
    if on_battery {
        host.set_on_external_power(false);
    }
    let orchestrator = app.orchestrator(host.clone());
    orchestrator.launch()?;
    if arm_refresh {
        orchestrator.chain().arm_refresh();
    }

    let _host_task = spawn_host(Arc::clone(&host));
    let _probe_task = match probe_target(&app.config.telemetry.base_url) {
        Some(target) => {
            let (rx, task) = spawn_connectivity_probe(
                target,
                Duration::from_secs(app.config.host.connectivity_probe_secs),
            );
            let follow = host.follow_connectivity(rx.clone());
            Some((orchestrator.observe_connectivity(rx), follow, task))
        }
        None => {
            tracing::warn!("⚠️ Cannot derive a probe target from '{}'", app.config.telemetry.base_url);
            None
        }
    };

    println!("⏱️ BGTasks v{}", env!("CARGO_PKG_VERSION"));
    println!("   Event log: {}", app.event_log.file_path().display());
    println!("   Slots:     {}", app.ids.max_processing_tasks());
    println!("   Interval:  {} min", orchestrator.chain().interval().num_minutes());

    match for_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            tokio::signal::ctrl_c().await?;
            println!("\n👋 Shutting down...");
        }
    }
    Ok(())
}

fn events(app: &App, action: EventsAction) {
    match action {
        EventsAction::List => {
            for line in app.event_log.load_all() {
                println!("{line}");
            }
        }
        EventsAction::Clear => {
            app.event_log.delete_all();
            println!("🗑️ Cleared {}", app.event_log.file_path().display());
        }
        EventsAction::BeginIdle => app.event_log.append_begin_idle(),
        EventsAction::EndIdle => app.event_log.append_end_idle(),
        EventsAction::Path => println!("{}", app.event_log.file_path().display()),
    }
}

async fn device_cmd(app: &App, action: DeviceAction) -> Result<()> {
    match action {
        DeviceAction::Id => println!("{}", device::device_id(app.store.as_ref())),
        DeviceAction::Token { token } => {
            if token.is_empty() || !token.chars().all(|c| c.is_ascii_hexdigit()) {
                anyhow::bail!("push token must be a non-empty hex string");
            }
            let orchestrator = app.orchestrator(app.local_scheduler());
            orchestrator.on_push_token(&token.to_ascii_lowercase()).await;
        }
        DeviceAction::Notifications { status } => {
            let orchestrator = app.orchestrator(app.local_scheduler());
            orchestrator.on_notification_status(status).await;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "bgtasks=debug,bgtasks_scheduler=debug,bgtasks_core=debug"
    } else {
        "bgtasks=info,bgtasks_scheduler=info,bgtasks_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let app = App::new(load_config(cli.config.as_deref())?)?;

    match cli.command {
        Command::Run {
            arm_refresh,
            on_battery,
            for_secs,
        } => run(app, arm_refresh, on_battery, for_secs).await,
        Command::Events { action } => {
            events(&app, action);
            Ok(())
        }
        Command::Device { action } => device_cmd(&app, action).await,
    }
}
