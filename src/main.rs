//! # kbsync CLI
//!
//! The `kbsync` binary initializes the store, runs syncs from the knowledge
//! base or a local vault, and reports on both.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbsync init` | Create the SQLite database and run schema migrations |
//! | `kbsync status` | Source configuration and ledger summary |
//! | `kbsync sync` | Run a sync from `api` or `vault` |
//! | `kbsync changes --since <ts>` | Print the remote change feed |
//! | `kbsync vault <action>` | Inspect the local vault |
//! | `kbsync stats` | Store contents and recent runs |
//! | `kbsync tags <action>` | Manage the tag catalog |
//! | `kbsync runs reset` | Release unfinished runs left by a crashed process |
//!
//! ## Examples
//!
//! ```bash
//! kbsync init --config ./config/kbsync.toml
//! kbsync sync --source api --language EN --dry-run
//! kbsync sync --source vault --force-update --json
//! kbsync vault quality --min-score 8
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kbsync::ingest::{self, SourceKind};
use kbsync::store::{ContentStore, SqliteStore};
use kbsync::sync::SyncOptions;
use kbsync::{config, logging, migrate, sources, stats, vault_cmd};

#[derive(Parser)]
#[command(
    name = "kbsync",
    about = "kbsync — reconcile knowledge-base content into a local content store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). See `config/kbsync.example.toml`.
    #[arg(long, global = true, default_value = "./config/kbsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Show source configuration and the sync ledger.
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Sync themes from a source into the content store.
    Sync {
        /// Where to read themes from.
        #[arg(long, value_enum, default_value = "api")]
        source: SourceKind,

        /// Only this format (code like `M` or name like `master`).
        #[arg(long)]
        format: Option<String>,

        /// Only this language (case-insensitive).
        #[arg(long)]
        language: Option<String>,

        /// Update content that already exists locally.
        #[arg(long)]
        force_update: bool,

        /// Convert and report without writing content.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of themes. Defaults to `[sync].default_limit`.
        #[arg(long)]
        limit: Option<usize>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the remote change feed.
    Changes {
        /// ISO-8601 timestamp.
        #[arg(long)]
        since: String,

        /// Comma-separated subset of `created,updated,deleted`.
        #[arg(long)]
        types: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Inspect the local vault.
    Vault {
        #[command(subcommand)]
        action: VaultAction,

        #[arg(long, global = true)]
        json: bool,
    },

    /// Show store statistics and recent runs.
    Stats,

    /// Manage the tag catalog.
    Tags {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Manage the sync run ledger.
    Runs {
        #[command(subcommand)]
        action: RunAction,
    },
}

#[derive(Subcommand)]
enum VaultAction {
    /// Themes, cornerstone first.
    Themes,
    /// File, word, format, and quality counts.
    Stats,
    /// Files marked cornerstone.
    Cornerstone,
    /// Files at or above a quality score.
    Quality {
        /// Minimum overall score (default 7.0).
        #[arg(long)]
        min_score: Option<f64>,
    },
    /// Files of one theme.
    Show {
        theme_id: String,
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        language: Option<String>,
    },
    /// Files of one format and language.
    Format { format: String, language: String },
}

#[derive(Subcommand)]
enum TagAction {
    /// Add a tag to the catalog.
    Add { slug: String, name: String },
    /// List catalog tags.
    List,
}

#[derive(Subcommand)]
enum RunAction {
    /// Mark unfinished runs as failed so a new sync can start.
    Reset {
        /// Only runs of this source label (e.g. `vault:./vault`).
        #[arg(long)]
        source: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init()?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Status { json } => {
            sources::show_status(&cfg, json).await?;
        }
        Commands::Sync {
            source,
            format,
            language,
            force_update,
            dry_run,
            limit,
            json,
        } => {
            let opts = SyncOptions {
                format,
                language,
                force_update,
                dry_run,
                limit: limit.unwrap_or(cfg.sync.default_limit),
            };
            ingest::run_ingest(&cfg, source, opts, json).await?;
        }
        Commands::Changes {
            since,
            types,
            limit,
            json,
        } => {
            ingest::run_changes(&cfg, &since, types, limit, json).await?;
        }
        Commands::Vault { action, json } => match action {
            VaultAction::Themes => vault_cmd::run_themes(&cfg, json)?,
            VaultAction::Stats => vault_cmd::run_stats(&cfg, json)?,
            VaultAction::Cornerstone => vault_cmd::run_cornerstone(&cfg, json)?,
            VaultAction::Quality { min_score } => vault_cmd::run_quality(&cfg, min_score, json)?,
            VaultAction::Show {
                theme_id,
                format,
                language,
            } => vault_cmd::run_show(
                &cfg,
                &theme_id,
                format.as_deref(),
                language.as_deref(),
                json,
            )?,
            VaultAction::Format { format, language } => {
                vault_cmd::run_by_format(&cfg, &format, &language, json)?
            }
        },
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Tags { action } => {
            let store = SqliteStore::connect(&cfg).await?;
            match action {
                TagAction::Add { slug, name } => {
                    let tag = store.insert_tag(&slug, &name).await?;
                    println!("added tag {} ({})", tag.slug, tag.id);
                }
                TagAction::List => {
                    for tag in store.list_tags().await? {
                        println!("{:<24} {}", tag.slug, tag.name);
                    }
                }
            }
            store.close().await;
        }
        Commands::Runs {
            action: RunAction::Reset { source },
        } => {
            let store = SqliteStore::connect(&cfg).await?;
            let released = store.reset_runs(source.as_deref()).await?;
            println!("released {} run(s)", released);
            store.close().await;
        }
    }

    Ok(())
}
