use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rolnodb::config::{ENV_CACHE_TTL_SECS, ENV_DATA_DIR};
use rolnodb::{DatabaseManager, HealthStatus, StoreBackup, StoreConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rolnodb")]
#[command(about = "Admin tooling for a RolnoDB data directory")]
struct Cli {
    /// Directory holding the collection files
    #[arg(long, env = ENV_DATA_DIR)]
    data_dir: Option<PathBuf>,

    /// Read-through cache lifetime in seconds
    #[arg(long, env = ENV_CACHE_TTL_SECS)]
    cache_ttl_secs: Option<u64>,

    /// Write collection files without indentation
    #[arg(long)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create every missing collection file with its empty shape
    Init,
    /// Validation, memory and lock state; exits non-zero when degraded
    Health,
    /// Path, entity count and in-memory size per collection
    Status,
    /// Re-read and structurally check every collection file
    Validate,
    /// Reload every collection from disk after out-of-band edits
    Reinit,
    /// Write a snapshot of every collection to a file
    Backup { out: PathBuf },
    /// Overwrite collections from a snapshot file
    Restore { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = StoreConfig::default().pretty(!cli.compact);
    if let Some(data_dir) = cli.data_dir {
        config = config.data_dir(data_dir);
    }
    if let Some(secs) = cli.cache_ttl_secs {
        config = config.cache_ttl(Duration::from_secs(secs));
    }
    config.validate().context("invalid configuration")?;

    let manager = DatabaseManager::new(config);
    manager
        .initialize_all()
        .await
        .with_context(|| format!("failed to open {}", manager.config().data_dir.display()))?;

    match cli.command {
        Command::Init => {
            print_json(&manager.status().await?)?;
        }
        Command::Health => {
            let report = manager.health_report().await?;
            print_json(&report)?;
            if report.status == HealthStatus::Degraded {
                bail!("unhealthy collections: {}", report.failing().join(", "));
            }
        }
        Command::Status => {
            print_json(&manager.status().await?)?;
        }
        Command::Validate => {
            let reports = manager.validate_all().await;
            print_json(&reports)?;
            let failing = reports.values().filter(|report| !report.is_ok()).count();
            if failing > 0 {
                bail!("{} collection(s) failed validation", failing);
            }
        }
        Command::Reinit => {
            let summary = manager.reload_all_from_disk().await;
            print_json(&summary)?;
            if !summary.is_clean() {
                bail!("{} collection(s) failed to reload", summary.failed.len());
            }
        }
        Command::Backup { out } => {
            let backup = manager.snapshot_all().await?;
            let bytes = serde_json::to_vec_pretty(&backup)?;
            tokio::fs::write(&out, bytes)
                .await
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(file = %out.display(), collections = backup.len(), "backup written");
        }
        Command::Restore { file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let backup: StoreBackup = serde_json::from_slice(&bytes)
                .with_context(|| format!("{} is not a backup file", file.display()))?;
            let outcomes = manager.restore_all(&backup).await;
            print_json(&outcomes)?;
            let failed = outcomes.values().filter(|report| !report.is_ok()).count();
            if failed > 0 {
                warn!(failed, "restore finished with failures");
                bail!("{} collection(s) failed to restore", failed);
            }
            info!(file = %file.display(), collections = outcomes.len(), "backup restored");
        }
    }

    manager.shutdown().await?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rolnodb=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
