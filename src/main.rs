//! # deckseer CLI (`seer`)
//!
//! The `seer` binary drives the maintenance side of deckseer (schema
//! installation, catalog download, batch ingestion, training) and starts
//! the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! seer --config ./config/seer.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `seer init` | Delete and recreate the remote collection schema |
//! | `seer fetch` | Download the card catalog and write it as JSONL |
//! | `seer ingest` | Stream the catalog into the store, training at the watermark |
//! | `seer train` | Start a training run and poll it to completion |
//! | `seer status` | Show (or watch) the training status |
//! | `seer serve` | Start the HTTP API server |

mod config;
mod dataset;
mod ingest;
mod models;
mod normalize;
mod progress;
mod recommend;
mod server;
mod store;
mod training;
mod users;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::models::CollectionSchema;
use crate::progress::ProgressMode;
use crate::store::{HttpRecommendStore, RecommendStore};
use crate::training::TrainingLifecycle;

/// deckseer — card catalog ingestion and recommendation serving over a
/// vector-backed recommendation store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/seer.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "seer",
    about = "deckseer — card catalog ingestion and recommendation serving",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/seer.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Delete and recreate the remote collection schema.
    ///
    /// Destructive: any previously ingested items, users, and trained state
    /// are discarded by the store.
    Init,

    /// Download the bulk card catalog and write it as deduplicated JSONL.
    Fetch {
        /// Where to write the catalog. Defaults to `[catalog].path`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Stream the catalog into the store in batches.
    ///
    /// When a training watermark is set (here or in config), any pending
    /// partial batch is flushed once the processed count reaches it and a
    /// training run is driven to completion before ingestion resumes.
    /// Re-run with `--start-at` to skip records already persisted by an
    /// earlier run while keeping the processed count (and therefore the
    /// watermark) aligned with the full catalog.
    Ingest {
        /// Catalog JSONL file. Defaults to `[catalog].path`.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Records per batch flush. Defaults to `[ingest].batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Processed count at which training triggers (at most once).
        #[arg(long)]
        train_at: Option<u64>,

        /// Skip persisting records at or below this processed count.
        #[arg(long)]
        start_at: Option<i64>,

        /// Seconds between training status polls.
        #[arg(long)]
        poll_secs: Option<u64>,

        /// Progress output: `off`, `human`, or `json`. Defaults to `human`
        /// when stderr is a TTY.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Start a training run (discarding previous trained state) and poll it
    /// to completion.
    Train {
        /// Seconds between training status polls.
        #[arg(long)]
        poll_secs: Option<u64>,
    },

    /// Show the current training status.
    Status {
        /// Keep polling an in-flight run until it reaches a terminal state.
        #[arg(long)]
        watch: bool,
    },

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deckseer=info,seer=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = HttpRecommendStore::new(&cfg.store)?;
            if let Err(e) = store.delete_collection().await {
                warn!(error = %e, "collection delete failed (it may not exist yet)");
            }
            store
                .create_collection(&CollectionSchema::cards(cfg.store.collection.clone()))
                .await
                .context("Failed to create collection schema")?;
            println!("Collection '{}' created.", cfg.store.collection);
        }
        Commands::Fetch { output } => {
            dataset::run_fetch(&cfg, output).await?;
        }
        Commands::Ingest {
            file,
            batch_size,
            train_at,
            start_at,
            poll_secs,
            progress,
        } => {
            let mode = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some("off") => ProgressMode::Off,
                Some("human") => ProgressMode::Human,
                Some("json") => ProgressMode::Json,
                Some(other) => bail!("Unknown progress mode: '{}'. Use off, human, or json.", other),
            };

            let path = file.unwrap_or_else(|| cfg.catalog.path.clone());
            let opts = ingest::IngestOptions {
                batch_size: batch_size.unwrap_or(cfg.ingest.batch_size),
                training_watermark: train_at.or(cfg.ingest.training_watermark),
                start_offset: start_at.unwrap_or(cfg.ingest.start_offset),
                poll_interval: Duration::from_secs(
                    poll_secs.unwrap_or(cfg.training.poll_interval_secs),
                ),
            };

            let store = HttpRecommendStore::new(&cfg.store)?;
            let source = ingest::catalog_lines(&path)
                .with_context(|| format!("Failed to open catalog: {}", path.display()))?;
            let reporter = mode.reporter();
            let report = ingest::run_ingest(&store, source, &opts, reporter.as_ref()).await?;

            println!("ingest {}", path.display());
            println!("  processed: {}", report.processed);
            println!("  stored: {} ({} batches)", report.stored, report.batches);
            println!("  skipped: {}", report.skipped);
            if report.trained {
                println!("  trained at watermark");
            }
            println!("ok");
        }
        Commands::Train { poll_secs } => {
            let store = HttpRecommendStore::new(&cfg.store)?;
            let poll =
                Duration::from_secs(poll_secs.unwrap_or(cfg.training.poll_interval_secs));

            let mut lifecycle = TrainingLifecycle::new(&store);
            lifecycle.start().await?;
            println!("training started");
            lifecycle.await_completion(poll).await?;
            println!("training complete");
        }
        Commands::Status { watch } => {
            let store = HttpRecommendStore::new(&cfg.store)?;
            let running = store.is_training().await?;
            let status = store.train_status().await?;

            println!("training: {}", if running { "in progress" } else { "idle" });
            println!("status: {}", status.status);
            if !status.detail.is_null() {
                println!("detail: {}", status.detail);
            }

            if watch && running {
                let poll = Duration::from_secs(cfg.training.poll_interval_secs);
                let mut lifecycle = TrainingLifecycle::attached(&store);
                lifecycle.await_completion(poll).await?;
                println!("training complete");
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
