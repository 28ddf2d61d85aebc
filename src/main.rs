//! # Search Sync CLI (`ssync`)
//!
//! The `ssync` binary is the operator interface for the search index
//! synchronization engine. It provides commands for index lifecycle
//! management, full-collection exports, single-entity resyncs, and index
//! status inspection.
//!
//! ## Usage
//!
//! ```bash
//! ssync --config ./config/ssync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ssync init [kind]` | Create (or migrate) aliased indices |
//! | `ssync sync <kind>` | Full export of one or all collections |
//! | `ssync sync-one <kind> <id>` | Resync a single entity |
//! | `ssync indices` | List indices, aliases, and document counts |
//! | `ssync delete-index <kind>` | Delete the physical index behind an alias |
//! | `ssync rebuild <kind>` | Migrate to a fresh index, then full sync |
//!
//! ## Examples
//!
//! ```bash
//! # Create every kind's index
//! ssync init all --config ./config/ssync.toml
//!
//! # Full export of posts, resumable from an offset
//! ssync sync posts --offset 12000
//!
//! # Dry run: count what would be written, touch nothing
//! ssync sync comments --dry-run
//!
//! # Re-index one post after a moderation change
//! ssync sync-one post abc123
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use search_sync::backend::elastic::ElasticBackend;
use search_sync::config;
use search_sync::convert::HtmlConverter;
use search_sync::lifecycle::LifecycleManager;
use search_sync::models::{EntityKind, SyncReport};
use search_sync::progress::ProgressMode;
use search_sync::status;
use search_sync::store::SqliteStore;
use search_sync::sync::{SyncOptions, Synchronizer};

/// Search Sync CLI — keeps the external search backend consistent with the
/// forum's source-of-truth collections.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ssync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ssync",
    about = "Search Sync — keeps an external search backend consistent with the forum's collections",
    version,
    long_about = "Search Sync mirrors five mutable source collections (posts, comments, users, \
    sequences, tags) into per-kind search indices behind stable aliases. It supports full \
    batch exports with change detection, single-entity incremental updates, and zero-downtime \
    index migrations."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ssync.toml`. Database, backend, and sync
    /// settings are read from this file.
    #[arg(long, global = true, default_value = "./config/ssync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create or migrate the aliased indices.
    ///
    /// For a kind with no index yet, creates a versioned physical index
    /// and points the alias at it. For a kind that already has one,
    /// migrates to a fresh index with the current mappings (read-only old
    /// index, server-side copy, atomic alias swap, delete old).
    Init {
        /// Kind to initialize: `all` or one of `posts`, `comments`,
        /// `users`, `sequences`, `tags`.
        #[arg(default_value = "all")]
        kind: String,
    },

    /// Full export of one or all collections into their indices.
    ///
    /// Pages through the primary store, transforms eligible entities,
    /// and writes only the documents whose indexed copy differs. Entities
    /// that turned ineligible are removed from the index.
    Sync {
        /// Kind to sync: `all` or one of `posts`, `comments`, `users`,
        /// `sequences`, `tags`.
        kind: String,

        /// Page offset to resume an interrupted run from.
        #[arg(long, default_value_t = 0)]
        offset: i64,

        /// Maximum number of entities to process.
        #[arg(long)]
        limit: Option<u64>,

        /// Override the page size from config.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Count entities and documents without writing to the backend.
        #[arg(long)]
        dry_run: bool,

        /// Progress output: `off`, `human`, or `json`. Defaults to `human`
        /// when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Resync a single entity by id.
    ///
    /// Upserts its current shards, trims stale ones, or removes it from
    /// the index entirely if it is gone or no longer eligible.
    SyncOne {
        /// Entity kind: `post`, `comment`, `user`, `sequence`, or `tag`.
        kind: String,
        /// Entity id in the primary store.
        id: String,
    },

    /// List indices, their aliases, and document counts.
    Indices,

    /// Delete the physical index behind a kind's alias.
    ///
    /// Destructive; requires `--yes`.
    DeleteIndex {
        /// Kind whose index to delete.
        kind: String,

        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Migrate to a fresh index with current mappings, then full sync.
    ///
    /// Equivalent to `init` followed by `sync` for the given kind. The old
    /// physical index is deleted after the migration; requires `--yes`.
    Rebuild {
        /// Kind to rebuild: `all` or a single kind.
        kind: String,

        /// Confirm the rebuild.
        #[arg(long)]
        yes: bool,
    },
}

/// Resolve a CLI kind argument into the kinds it names.
fn parse_kinds(arg: &str) -> Result<Vec<EntityKind>> {
    if arg == "all" {
        return Ok(EntityKind::all().to_vec());
    }
    match EntityKind::parse(arg) {
        Some(kind) => Ok(vec![kind]),
        None => bail!(
            "unknown kind '{}' (expected all, posts, comments, users, sequences, or tags)",
            arg
        ),
    }
}

fn print_report(kind: EntityKind, report: &SyncReport) {
    println!(
        "{}: processed {} of {}, written {}, skipped {}, deleted {}",
        kind.alias(),
        report.processed,
        report.total,
        report.written,
        report.skipped,
        report.deleted
    );
    if report.planned > 0 {
        println!("  dry run: {} documents would be written", report.planned);
    }
    if !report.ok() {
        println!("  {} errors (resume with --offset {}):", report.errors.len(), report.last_offset);
        for err in &report.errors {
            println!("    {}", err);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let backend = match ElasticBackend::from_config(&cfg.backend)? {
        Some(backend) => backend,
        None => {
            // Search is a non-critical enhancement: a deployment without a
            // configured backend gets a no-op, not a crash.
            println!("search backend not configured (backend.url is unset); nothing to do");
            return Ok(());
        }
    };

    match cli.command {
        Commands::Init { kind } => {
            let manager = LifecycleManager::new(&backend);
            for kind in parse_kinds(&kind)? {
                let physical = manager.configure_index(kind).await?;
                println!("{} -> {}", kind.alias(), physical);
            }
        }
        Commands::Sync {
            kind,
            offset,
            limit,
            batch_size,
            dry_run,
            progress,
        } => {
            let kinds = parse_kinds(&kind)?;
            let mode = match progress.as_deref() {
                Some(s) => ProgressMode::parse(s)
                    .ok_or_else(|| anyhow::anyhow!("invalid --progress value '{}'", s))?,
                None => ProgressMode::default_for_tty(),
            };
            let store = SqliteStore::connect(&cfg).await?;
            let converter = HtmlConverter;
            let synchronizer = Synchronizer::new(&store, &backend, &converter, &cfg);
            let opts = SyncOptions {
                offset,
                limit,
                batch_size,
                dry_run,
            };
            let reporter = mode.reporter();
            let mut failed = false;
            for kind in kinds {
                let report = synchronizer.full_sync(kind, &opts, reporter.as_ref()).await?;
                print_report(kind, &report);
                failed |= !report.ok();
            }
            store.close().await;
            if failed {
                bail!("sync finished with errors");
            }
        }
        Commands::SyncOne { kind, id } => {
            let kind = EntityKind::parse(&kind)
                .ok_or_else(|| anyhow::anyhow!("unknown kind '{}'", kind))?;
            let store = SqliteStore::connect(&cfg).await?;
            let converter = HtmlConverter;
            let synchronizer = Synchronizer::new(&store, &backend, &converter, &cfg);
            let report = synchronizer.sync_one(kind, &id).await?;
            print_report(kind, &report);
            store.close().await;
            if !report.ok() {
                bail!("sync finished with errors");
            }
        }
        Commands::Indices => {
            status::list_indices(&backend).await?;
        }
        Commands::DeleteIndex { kind, yes } => {
            let kind = EntityKind::parse(&kind)
                .ok_or_else(|| anyhow::anyhow!("unknown kind '{}'", kind))?;
            if !yes {
                bail!("refusing to delete the '{}' index without --yes", kind.alias());
            }
            LifecycleManager::new(&backend).delete_index(kind).await?;
            println!("deleted index behind '{}'", kind.alias());
        }
        Commands::Rebuild { kind, yes } => {
            if !yes {
                bail!("refusing to rebuild without --yes");
            }
            let kinds = parse_kinds(&kind)?;
            let manager = LifecycleManager::new(&backend);
            let store = SqliteStore::connect(&cfg).await?;
            let converter = HtmlConverter;
            let synchronizer = Synchronizer::new(&store, &backend, &converter, &cfg);
            let reporter = ProgressMode::default_for_tty().reporter();
            for kind in kinds {
                let physical = manager.configure_index(kind).await?;
                println!("{} -> {}", kind.alias(), physical);
                let report = synchronizer
                    .full_sync(kind, &SyncOptions::default(), reporter.as_ref())
                    .await?;
                print_report(kind, &report);
            }
            store.close().await;
        }
    }

    Ok(())
}
