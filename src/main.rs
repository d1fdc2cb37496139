//! wanmesh CLI - Tunnel mesh orchestration for SD-WAN edge devices
//!
//! Jobs are written to a JSON-lines spool for the delivery system; their
//! outcomes are reported back with `wanmesh event`. Rollbacks that could not
//! finish are kept in the database and retried with `wanmesh rollbacks retry`.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use sea_orm::DatabaseConnection;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use wanmesh::{config, spool::SpoolJobQueue};
use wanmesh_control::{
    derive_tunnel_params, DbDeviceFleet, DeadLetterStore, JobQueue, MeshConfig, TunnelLifecycle,
    TunnelStore, MAX_TUNNEL_NUMBERS,
};
use wanmesh_proto::{Device, JobEvent};

/// wanmesh - Orchestrate secure tunnel meshes between edge devices
#[derive(Parser, Debug)]
#[command(name = "wanmesh")]
#[command(about = "Orchestrate secure tunnel meshes between edge devices", long_about = None)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "WANMESH_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL, overrides the configuration file
    #[arg(long, global = true, env = "WANMESH_DATABASE_URL")]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage the device inventory
    Devices {
        #[command(subcommand)]
        command: DeviceCommands,
    },
    /// Print the addressing derived from a tunnel number
    Params {
        /// Tunnel number
        num: u32,
    },
    /// Create, delete and list tunnels
    Tunnels {
        #[command(subcommand)]
        command: TunnelCommands,
    },
    /// Report the outcome of a tunnel job
    Event {
        /// Terminal state of the job
        #[arg(long, value_enum)]
        kind: EventKind,
        /// Job id as written to the spool
        #[arg(long)]
        job_id: String,
        /// Correlation payload of the job (the `data` field), as JSON
        #[arg(long)]
        result: String,
        /// Error message reported by the agent
        #[arg(long)]
        error: Option<String>,
        /// Spool receiving rollback jobs
        #[arg(long, default_value = "wanmesh-jobs.jsonl")]
        spool: PathBuf,
    },
    /// Inspect and retry abandoned rollbacks
    Rollbacks {
        #[command(subcommand)]
        command: RollbackCommands,
    },
}

#[derive(Subcommand, Debug)]
enum RollbackCommands {
    /// List tunnels whose rollback was abandoned
    List {
        #[arg(long)]
        org: Option<String>,
    },
    /// Retry abandoned rollbacks
    Retry {
        #[arg(long)]
        org: Option<String>,
        /// Spool receiving the remove jobs
        #[arg(long, default_value = "wanmesh-jobs.jsonl")]
        spool: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum DeviceCommands {
    /// Import devices from a YAML or JSON list
    Import {
        /// File containing the device records
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum TunnelCommands {
    /// List tunnels of an organization
    List {
        #[arg(long)]
        org: String,
        /// Include inactive tunnels
        #[arg(long)]
        all: bool,
    },
    /// Build a tunnel mesh between devices
    Add {
        #[arg(long)]
        org: String,
        #[arg(long, default_value = "operator")]
        requester: String,
        /// Spool receiving the device jobs
        #[arg(long, default_value = "wanmesh-jobs.jsonl")]
        spool: PathBuf,
        /// Device ids
        #[arg(required = true)]
        devices: Vec<Uuid>,
    },
    /// Delete a tunnel
    Del {
        #[arg(long)]
        org: String,
        #[arg(long, default_value = "operator")]
        requester: String,
        /// Spool receiving the device jobs
        #[arg(long, default_value = "wanmesh-jobs.jsonl")]
        spool: PathBuf,
        tunnel_id: Uuid,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EventKind {
    Completed,
    Failed,
    Removed,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    let config = config::load(cli.config.as_deref(), cli.database_url.clone())?;

    match cli.command {
        Commands::Migrate => {
            open_database(&config).await?;
            info!("Database is up to date");
            Ok(())
        }
        Commands::Devices { command } => handle_devices_command(&config, command).await,
        Commands::Params { num } => print_params(num),
        Commands::Tunnels { command } => handle_tunnels_command(&config, command).await,
        Commands::Event {
            kind,
            job_id,
            result,
            error,
            spool,
        } => handle_event_command(&config, kind, job_id, &result, error, spool).await,
        Commands::Rollbacks { command } => handle_rollbacks_command(&config, command).await,
    }
}

async fn handle_devices_command(config: &MeshConfig, command: DeviceCommands) -> Result<()> {
    match command {
        DeviceCommands::Import { file } => {
            let contents = std::fs::read_to_string(&file)
                .context(format!("Failed to read device file: {:?}", file))?;
            let devices: Vec<Device> = serde_yaml::from_str(&contents)
                .context(format!("Failed to parse device file: {:?}", file))?;

            let db = open_database(config).await?;
            let fleet = DbDeviceFleet::new(db);
            for device in &devices {
                fleet
                    .upsert(device)
                    .await
                    .context(format!("Failed to import device {}", device.hostname))?;
            }

            println!("Imported {} device(s)", devices.len());
            Ok(())
        }
    }
}

async fn handle_tunnels_command(config: &MeshConfig, command: TunnelCommands) -> Result<()> {
    let db = open_database(config).await?;

    match command {
        TunnelCommands::List { org, all } => {
            let tunnels = TunnelStore::new(db).list(&org, !all).await?;
            println!("{}", serde_json::to_string_pretty(&tunnels)?);
            Ok(())
        }
        TunnelCommands::Add {
            org,
            requester,
            spool,
            devices,
        } => {
            let lifecycle = build_lifecycle(db, config, spool);
            let summary = lifecycle.apply_tunnel_add(&org, &devices, &requester).await?;

            for created in &summary.created {
                println!("tunnel {} (#{})", created.tunnel_id, created.num);
            }
            for failure in &summary.failed {
                println!("failed: {}", failure);
            }
            println!("{}", summary.message());
            Ok(())
        }
        TunnelCommands::Del {
            org,
            requester,
            spool,
            tunnel_id,
        } => {
            let lifecycle = build_lifecycle(db, config, spool);
            let summary = lifecycle
                .apply_tunnel_del(&org, &[tunnel_id], &requester)
                .await?;

            println!(
                "Tunnel #{}: {}/{} remove jobs dispatched",
                summary.num, summary.jobs_accepted, summary.jobs_total
            );
            if !summary.deactivated {
                warn!(tunnel_id = %summary.tunnel_id, "Tunnel kept active until all remove jobs are accepted");
            }
            Ok(())
        }
    }
}

async fn handle_event_command(
    config: &MeshConfig,
    kind: EventKind,
    job_id: String,
    result: &str,
    error: Option<String>,
    spool: PathBuf,
) -> Result<()> {
    let result: serde_json::Value =
        serde_json::from_str(result).context("Job result is not valid JSON")?;
    let event = match kind {
        EventKind::Completed => JobEvent::Completed { job_id, result },
        EventKind::Failed => JobEvent::Failed {
            job_id,
            result,
            error,
        },
        EventKind::Removed => JobEvent::Removed { job_id, result },
    };

    let db = open_database(config).await?;
    let lifecycle = build_lifecycle(db, config, spool);
    let started = Utc::now();
    lifecycle.handle_event(event).await;

    let abandoned: Vec<_> = lifecycle
        .dead_letters()
        .list(None)
        .await?
        .into_iter()
        .filter(|letter| letter.failed_at >= started)
        .collect();
    if !abandoned.is_empty() {
        eprintln!("{}", serde_json::to_string_pretty(&abandoned)?);
        bail!(
            "Rollback of {} tunnel(s) did not complete; retry with `wanmesh rollbacks retry`",
            abandoned.len()
        );
    }
    Ok(())
}

async fn handle_rollbacks_command(config: &MeshConfig, command: RollbackCommands) -> Result<()> {
    let db = open_database(config).await?;

    match command {
        RollbackCommands::List { org } => {
            let letters = DeadLetterStore::new(db).list(org.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&letters)?);
            Ok(())
        }
        RollbackCommands::Retry { org, spool } => {
            let lifecycle = build_lifecycle(db, config, spool);
            let resolved = lifecycle.retry_dead_letters(org.as_deref()).await?;
            let remaining = lifecycle.dead_letters().list(org.as_deref()).await?;

            println!("{} rollback(s) resolved, {} still pending", resolved, remaining.len());
            if !remaining.is_empty() {
                eprintln!("{}", serde_json::to_string_pretty(&remaining)?);
                bail!("Rollback of {} tunnel(s) did not complete", remaining.len());
            }
            Ok(())
        }
    }
}

fn print_params(num: u32) -> Result<()> {
    if num >= MAX_TUNNEL_NUMBERS {
        bail!("Tunnel number must be below {}", MAX_TUNNEL_NUMBERS);
    }

    println!("{}", serde_json::to_string_pretty(&derive_tunnel_params(num))?);
    Ok(())
}

async fn open_database(config: &MeshConfig) -> Result<DatabaseConnection> {
    let db = wanmesh_db::connect(&config.database_url)
        .await
        .context(format!("Failed to connect to {}", config.database_url))?;
    wanmesh_db::migrate(&db)
        .await
        .context("Failed to run database migrations")?;
    Ok(db)
}

fn build_lifecycle(db: DatabaseConnection, config: &MeshConfig, spool: PathBuf) -> TunnelLifecycle {
    let queue: Arc<dyn JobQueue> = Arc::new(SpoolJobQueue::new(spool));
    let fleet = Arc::new(DbDeviceFleet::new(db.clone()));
    TunnelLifecycle::new(db, queue, fleet).with_config(config.clone())
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
