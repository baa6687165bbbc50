//! Asset Sentinel - maintenance backend server
//!
//! Pushes live work-order, inventory and maintenance notifications to connected
//! clients, scoped per organization, and runs the recurring maintenance scan.

mod api;
mod config;
mod events;
mod models;
mod scheduler;
mod services;
mod storage;
mod websocket;

use anyhow::Result;
use chrono::{Duration as DateDuration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::Config;
use crate::models::{NewInventoryPart, NewMaintenancePlan, NewMaintenanceTask, NewWorkOrder, Priority};
use crate::scheduler::{Scanner, Scheduler};
use crate::storage::{MaintenanceStore, Storage};
use crate::websocket::Hub;

const AURORA_BLUE: &str = "\x1b[38;5;117m";
const PULSE_CYAN: &str = "\x1b[38;5;51m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

#[derive(Parser)]
#[command(name = "asset-sentinel")]
#[command(about = "Maintenance backend: live notifications and maintenance scheduling")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/websocket server and the maintenance scheduler
    Serve {
        /// Path to config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Wait one full interval before the first scan
        #[arg(long)]
        no_initial_scan: bool,
    },

    /// Run one maintenance scan against the database and print the report
    Scan {
        /// Path to config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Scan as of this date (YYYY-MM-DD) instead of today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Insert a demo organization with a due plan, an overdue task, a part and a work order
    Seed {
        /// Path to config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Initialize default configuration file
        #[arg(short, long)]
        init: bool,
    },

    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            no_initial_scan,
        } => {
            let mut config = Config::resolve(config.as_deref())?;
            if let Some(host) = host {
                config.http_host = host;
            }
            if let Some(port) = port {
                config.http_port = port;
            }
            init_logging(cli.verbose, cli.debug, &config.log_level);
            run_serve(config, !no_initial_scan).await?;
        }
        Commands::Scan { config, date } => {
            let config = Config::resolve(config.as_deref())?;
            init_logging(cli.verbose, cli.debug, "warn");
            run_scan(config, date).await?;
        }
        Commands::Seed { config } => {
            let config = Config::resolve(config.as_deref())?;
            init_logging(cli.verbose, cli.debug, "warn");
            run_seed(config).await?;
        }
        Commands::Config { show, init } => {
            manage_config(show, init)?;
        }
        Commands::Version => {
            print_version();
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `--debug`, `--verbose`, then `fallback`.
fn init_logging(verbose: bool, debug: bool, fallback: &str) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        fallback
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn print_version() {
    println!(
        "{}✦{} {}Asset Sentinel{} {}v{}{}",
        BOLD, RESET, BOLD, RESET, AURORA_BLUE, env!("CARGO_PKG_VERSION"), RESET
    );
}

fn print_banner(config: &Config) {
    println!(
        "{}╭─────────────────────────────────────────────────────╮{}",
        AURORA_BLUE, RESET
    );
    println!(
        "{}│{} {}✦ Asset Sentinel v{}{}",
        AURORA_BLUE, RESET, BOLD, env!("CARGO_PKG_VERSION"), RESET
    );
    println!(
        "{}│{} {}Database:{}  {:?}",
        AURORA_BLUE, RESET, DIM, RESET, config.db_path
    );
    println!(
        "{}│{} {}Listen:{}    http://{}",
        AURORA_BLUE, RESET, DIM, RESET, config.bind_addr()
    );
    println!(
        "{}│{} {}Scan every:{} {}s",
        AURORA_BLUE, RESET, DIM, RESET, config.scheduler_interval_secs
    );
    println!(
        "{}╰─────────────────────────────────────────────────────╯{}",
        AURORA_BLUE, RESET
    );
}

async fn open_storage(config: &Config) -> Result<Storage> {
    config.ensure_dirs()?;
    let storage = Storage::new(&config.db_path).await?;
    storage.initialize().await?;
    Ok(storage)
}

async fn run_serve(config: Config, initial_scan: bool) -> Result<()> {
    print_banner(&config);
    info!("Starting Asset Sentinel");

    let storage = open_storage(&config).await?;

    let (hub, hub_task) = Hub::spawn(config.hub_channel_capacity);

    let store: Arc<dyn MaintenanceStore> = Arc::new(storage.clone());
    let scheduler = Arc::new(
        Scheduler::new(Scanner::new(store, hub.clone()), config.scheduler_interval())
            .with_initial_scan(initial_scan),
    );
    scheduler.start();

    let state = AppState::new(storage, hub.clone(), scheduler.clone(), config);
    let served = api::run_server(state, shutdown_signal()).await;

    info!("Shutting down");
    scheduler.stop().await;
    if let Err(e) = hub.shutdown().await {
        warn!(error = %e, "hub already stopped");
    }
    if let Err(e) = hub_task.await {
        error!(error = %e, "hub loop ended abnormally");
    }

    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn run_scan(config: Config, date: Option<NaiveDate>) -> Result<()> {
    let storage = open_storage(&config).await?;
    let (hub, hub_task) = Hub::spawn(config.hub_channel_capacity);

    let today = date.unwrap_or_else(|| Local::now().date_naive());
    let report = Scanner::new(Arc::new(storage), hub.clone())
        .run_once(today)
        .await;

    let _ = hub.shutdown().await;
    let _ = hub_task.await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_seed(config: Config) -> Result<()> {
    let storage = open_storage(&config).await?;
    let today = Local::now().date_naive();

    let org = storage.create_organization("Demo Plant").await?;
    let plan = storage
        .create_maintenance_plan(&NewMaintenancePlan {
            organization_id: org.id,
            asset_id: 1,
            frequency_days: 30,
            estimated_duration_hours: Some(2.0),
            assigned_role: Some("technician".to_string()),
            next_maintenance_date: today,
        })
        .await?;

    let mut overdue = NewMaintenanceTask::pending_for(&plan);
    overdue.scheduled_date = today - DateDuration::days(3);
    let task = storage.create_maintenance_task(&overdue).await?;

    let part = storage
        .create_inventory_part(
            org.id,
            &NewInventoryPart {
                name: "Hydraulic filter".to_string(),
                sku: "HF-100".to_string(),
                quantity: 12,
                min_threshold: 10,
                cost_per_unit: 18.5,
                location: Some("Bay 2".to_string()),
            },
        )
        .await?;

    let wo = storage
        .create_work_order(
            org.id,
            None,
            &NewWorkOrder {
                asset_id: 1,
                technician_id: None,
                title: "Inspect hydraulic line".to_string(),
                description: None,
                priority: Priority::High,
                notes: None,
            },
        )
        .await?;

    println!("{}✓{} Seeded {:?}", PULSE_CYAN, RESET, config.db_path);
    println!("  organization  {}", org.id);
    println!("  plan          {} (due {})", plan.id, plan.next_maintenance_date);
    println!("  task          {} (scheduled {})", task.id, task.scheduled_date);
    println!("  part          {} ({} on hand, threshold {})", part.id, part.quantity, part.min_threshold);
    println!("  work order    {}", wo.id);
    Ok(())
}

fn manage_config(show: bool, init: bool) -> Result<()> {
    let config_path = Config::default_path();

    if init {
        let config = Config::default();
        config.save(&config_path)?;
        println!("{}✦ Configuration created at {:?}{}", PULSE_CYAN, config_path, RESET);
        return Ok(());
    }

    if show || !init {
        let config = if config_path.exists() {
            Config::load(&config_path)?
        } else {
            println!("{}✦ No config file found, showing defaults{}", DIM, RESET);
            Config::default()
        };
        println!("{}", serde_json::to_string_pretty(&config)?);
    }

    Ok(())
}
