pub mod ingest;
pub mod pending;
pub mod reconcile;
pub mod stats;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};

use relink_core::config::RelinkConfig;
use relink_core::store::SqliteBackend;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest one or more projects and reconcile pending calls
    Ingest(ingest::IngestArgs),
    /// Re-evaluate stored pending calls without ingesting
    Reconcile(reconcile::ReconcileArgs),
    /// List call sites still waiting for a definition
    Pending(pending::PendingArgs),
    /// Show node, relationship and pending-call counts
    Stats(stats::StatsArgs),
}

pub async fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Ingest(args) => ingest::run(args).await,
        Command::Reconcile(args) => reconcile::run(args).await,
        Command::Pending(args) => pending::run(args).await,
        Command::Stats(args) => stats::run(args).await,
    }
}

/// Options shared by every command that touches the database.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Config file (default: .relink/config.toml when present)
    #[arg(long, env = "RELINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path (overrides `[store] path`)
    #[arg(long, env = "RELINK_DB")]
    pub db: Option<PathBuf>,
}

impl StoreArgs {
    pub fn load_config(&self) -> anyhow::Result<RelinkConfig> {
        match &self.config {
            Some(path) => RelinkConfig::load(path)
                .with_context(|| format!("Cannot load config: {}", path.display())),
            None => RelinkConfig::load_or_default(Path::new(".relink/config.toml"))
                .context("Cannot load config: .relink/config.toml"),
        }
    }

    pub fn db_path(&self, config: &RelinkConfig) -> PathBuf {
        self.db.clone().unwrap_or_else(|| config.store.path.clone())
    }

    /// Open the database, creating it and its directory when `create` is set.
    pub fn open(&self, config: &RelinkConfig, create: bool) -> anyhow::Result<SqliteBackend> {
        let db_path = self.db_path(config);
        if create {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Cannot create directory: {}", parent.display()))?;
            }
        } else if !db_path.exists() {
            anyhow::bail!(
                "Database not found: {}. Run `relink ingest` first.",
                db_path.display()
            );
        }
        SqliteBackend::open(&db_path)
            .with_context(|| format!("Cannot open database: {}", db_path.display()))
    }
}
