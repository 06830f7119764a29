use anyhow::Result;
use serde_json::json;

use crate::config::Config;
use crate::store::SqliteStore;
use crate::trigger::{ledger_status, source_status};

/// `kbsync status`: source configuration plus the ledger summary.
pub async fn show_status(config: &Config, json: bool) -> Result<()> {
    let source = source_status(config);
    let store = SqliteStore::connect(config).await?;
    let ledger = ledger_status(&store).await;
    store.close().await;
    let ledger = ledger?;

    if json {
        let out = json!({ "source": source, "ledger": ledger });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let vault_status = match &config.vault {
        Some(v) if v.root.is_dir() => "OK".to_string(),
        Some(_) => "NOT CONFIGURED (root does not exist)".to_string(),
        None => "NOT CONFIGURED".to_string(),
    };
    let api_status = match (source.configured, &source.api_url) {
        (true, Some(url)) => format!("OK ({})", url),
        (false, Some(_)) => "NOT CONFIGURED (missing api key)".to_string(),
        _ => "NOT CONFIGURED".to_string(),
    };

    println!("{:<8} STATUS", "SOURCE");
    println!("{:<8} {}", "api", api_status);
    println!("{:<8} {}", "vault", vault_status);
    println!();
    println!(
        "last sync:  {}",
        ledger.last_sync.as_deref().unwrap_or("never")
    );
    println!("running:    {}", ledger.is_running);
    println!(
        "items:      {} total, {} synced, {} failed",
        ledger.total_items, ledger.synced_items, ledger.failed_items
    );
    Ok(())
}
