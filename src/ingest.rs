//! `kbsync sync` and `kbsync changes`.
//!
//! Builds the selected theme source from configuration, opens the store,
//! runs the orchestrator with Ctrl-C wired to cancellation, and prints the
//! run summary (plain text, or the trigger response shape with `--json`).

use anyhow::{Context, Result};
use clap::ValueEnum;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::client::{ChangesQuery, KnowledgeClient};
use crate::config::Config;
use crate::models::ChangeType;
use crate::source::ThemeSource;
use crate::store::SqliteStore;
use crate::sync::{run_sync, SyncOptions, SyncResult};
use crate::trigger::TriggerResponse;
use crate::vault::Vault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// The remote knowledge-base API (`[api]`).
    Api,
    /// A local vault directory (`[vault]`).
    Vault,
}

pub fn build_source(config: &Config, kind: SourceKind) -> Result<Box<dyn ThemeSource>> {
    match kind {
        SourceKind::Api => {
            let api = config
                .api
                .as_ref()
                .context("No [api] section in config")?;
            Ok(Box::new(KnowledgeClient::new(api)?))
        }
        SourceKind::Vault => {
            let vault = config
                .vault
                .as_ref()
                .context("No [vault] section in config")?;
            Ok(Box::new(Vault::new(vault)?))
        }
    }
}

/// Cancel `token` on Ctrl-C; a pending fetch or write is abandoned and no
/// further units start. A second Ctrl-C exits immediately.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupt received, cancelling sync");
        token.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second interrupt, exiting");
            std::process::exit(130);
        }
    });
}

pub async fn run_ingest(
    config: &Config,
    kind: SourceKind,
    opts: SyncOptions,
    json: bool,
) -> Result<()> {
    let source = build_source(config, kind)?;
    let store = SqliteStore::connect(config).await?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let result = run_sync(source.as_ref(), &store, &opts, &cancel).await;
    store.close().await;
    let result = result?;

    if json {
        let response = TriggerResponse {
            success: true,
            dry_run: opts.dry_run,
            result: result.into(),
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_summary(&source.label(), &opts, &result);
    }
    Ok(())
}

fn print_summary(label: &str, opts: &SyncOptions, result: &SyncResult) {
    if opts.dry_run {
        println!("sync {} (dry-run)", label);
    } else {
        println!("sync {}", label);
    }
    println!("  total: {}", result.total_files);
    println!("  processed: {}", result.processed_files);
    if !opts.dry_run {
        println!("  imported: {}", result.imported_files);
        println!("  updated: {}", result.updated_files);
    }
    println!("  skipped: {}", result.skipped_files);
    println!("  errors: {}", result.error_files);
    for e in &result.errors {
        println!("    {}: {}", e.file, e.error);
    }
    println!("ok");
}

/// Print the remote change feed since `since` (ISO-8601).
pub async fn run_changes(
    config: &Config,
    since: &str,
    types: Option<String>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let api = config
        .api
        .as_ref()
        .context("No [api] section in config")?;
    let client = KnowledgeClient::new(api)?;

    let changes = client
        .sync_changes(&ChangesQuery {
            since: since.to_string(),
            types,
            limit,
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }

    println!(
        "{:<8} {:<28} {:<8} {:<5} {}",
        "CHANGE", "THEME", "FORMAT", "LANG", "AT"
    );
    for c in &changes {
        let kind = match c.change_type {
            ChangeType::Created => "created",
            ChangeType::Updated => "updated",
            ChangeType::Deleted => "deleted",
        };
        println!(
            "{:<8} {:<28} {:<8} {:<5} {}",
            kind,
            c.theme_id,
            c.format.as_deref().unwrap_or("-"),
            c.lang.as_deref().unwrap_or("-"),
            c.timestamp
        );
    }
    println!("{} change(s)", changes.len());
    Ok(())
}
