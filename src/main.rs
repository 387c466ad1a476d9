//! # siteindex CLI
//!
//! ## Usage
//!
//! ```bash
//! siteindex --config ./config/siteindex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `siteindex index` | Bring the index in line with the configured sources |
//! | `siteindex status` | Show per-source file and chunk counts |
//! | `siteindex backup create` | Snapshot the index directory now |
//! | `siteindex backup list` | List snapshots, newest first |
//! | `siteindex backup latest` | Print the newest snapshot path |
//! | `siteindex backup restore <PATH>` | Replace the index directory with a snapshot |
//!
//! Logs go to stderr (filter with `RUST_LOG`); summaries go to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use siteindex::backup::BackupManager;
use siteindex::builder::{BuildOptions, IndexBuilder};
use siteindex::config::{self, Config};
use siteindex::embedding;
use siteindex::status;
use siteindex::store::LocalVectorStore;

/// siteindex: incremental document indexing for project folders.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/siteindex.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "siteindex",
    about = "Incremental document indexing for construction-project folders",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/siteindex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index new and changed files, and drop deleted ones.
    ///
    /// Without `--limit` this is a full run: a backup is taken first and
    /// files missing from the corpus are removed from the index. With
    /// `--limit` only that many files are looked at and nothing is deleted.
    Index {
        /// Re-index every file even when its content is unchanged.
        #[arg(long)]
        force: bool,

        /// Look at no more than this many files (partial run).
        #[arg(long)]
        limit: Option<usize>,

        /// Only index these sources. Repeatable.
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what the manifest says is indexed.
    Status,

    /// Manage index backups.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Snapshot the index directory now.
    Create,
    /// List snapshots, newest first.
    List,
    /// Print the path of the newest snapshot.
    Latest,
    /// Replace the index directory with the contents of a snapshot.
    Restore {
        /// Path to a `backup-*.tar.gz` archive.
        path: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index {
            force,
            limit,
            sources,
            dry_run,
        } => {
            let opts = BuildOptions {
                force,
                limit,
                sources,
                dry_run,
            };
            run_index(&cfg, &opts).await?;
        }
        Commands::Status => {
            status::run_status(&cfg)?;
        }
        Commands::Backup { action } => {
            run_backup(&cfg, action)?;
        }
    }

    Ok(())
}

async fn run_index(cfg: &Config, opts: &BuildOptions) -> anyhow::Result<()> {
    let store = Arc::new(LocalVectorStore::open(&cfg.index.dir)?);
    let embedder = embedding::create_embedder(&cfg.embedding)?;
    let mut builder = IndexBuilder::from_config(cfg, store, embedder)?;

    let report = builder.run(opts).await.context("index run aborted")?;
    report.print_summary();
    Ok(())
}

fn run_backup(cfg: &Config, action: BackupAction) -> anyhow::Result<()> {
    let manager = BackupManager::new(
        cfg.index.dir.clone(),
        cfg.backup_dir(),
        cfg.backup.max_backups,
    );

    match action {
        BackupAction::Create => match manager.create_backup()? {
            Some(path) => println!("{}", path.display()),
            None => println!("index directory is empty, nothing to back up"),
        },
        BackupAction::List => {
            let backups = manager.list_backups()?;
            if backups.is_empty() {
                println!("no backups in {}", manager.backup_dir().display());
            }
            for b in backups {
                println!(
                    "{}  {:>10}  {}",
                    b.modified.format("%Y-%m-%d %H:%M:%S"),
                    b.size,
                    b.path.display()
                );
            }
        }
        BackupAction::Latest => match manager.get_latest_backup()? {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("no backups in {}", manager.backup_dir().display()),
        },
        BackupAction::Restore { path } => {
            manager.restore_backup(&path)?;
            println!("restored {}", path.display());
        }
    }
    Ok(())
}
