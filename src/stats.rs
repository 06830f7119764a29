//! Store statistics and run history.
//!
//! Summarizes what the local store holds (content by type and language,
//! translations, tag links) and the most recent sync runs per source. Used
//! by `kbsync stats` to confirm that syncs are landing as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::store::SqliteStore;

/// How many recent runs the stats table lists.
const RECENT_RUNS: i64 = 10;

struct RunRow {
    source: String,
    status: String,
    dry_run: bool,
    started_at: i64,
    total: i64,
    imported: i64,
    errors: i64,
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let pool = store.pool();

    let total_contents = store.count_rows("contents").await?;
    let total_translations = store.count_rows("content_translations").await?;
    let total_tags = store.count_rows("tags").await?;
    let total_links = store.count_rows("content_tags").await?;
    let premium: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contents WHERE is_premium = 1")
        .fetch_one(pool)
        .await?;
    let published: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM contents WHERE is_published = 1")
            .fetch_one(pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("kbsync — Store Stats");
    println!("====================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Contents:      {}", total_contents);
    println!("  Published:     {} / {}", published, total_contents);
    println!("  Premium:       {} / {}", premium, total_contents);
    println!("  Translations:  {}", total_translations);
    println!("  Tags:          {} ({} links)", total_tags, total_links);

    let type_rows = sqlx::query(
        r#"
        SELECT c.content_type, t.language, COUNT(*) AS n
        FROM contents c
        JOIN content_translations t ON t.content_id = c.id
        GROUP BY c.content_type, t.language
        ORDER BY n DESC, c.content_type ASC, t.language ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    if !type_rows.is_empty() {
        println!();
        println!("  By type:");
        println!("  {:<12} {:<6} {:>8}", "TYPE", "LANG", "COUNT");
        println!("  {}", "-".repeat(28));
        for row in &type_rows {
            println!(
                "  {:<12} {:<6} {:>8}",
                row.get::<String, _>("content_type"),
                row.get::<String, _>("language"),
                row.get::<i64, _>("n")
            );
        }
    }

    let run_rows = sqlx::query(
        r#"
        SELECT source, status, dry_run, started_at, total_files, imported_files, error_files
        FROM sync_runs
        ORDER BY started_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(RECENT_RUNS)
    .fetch_all(pool)
    .await?;

    let runs: Vec<RunRow> = run_rows
        .iter()
        .map(|row| RunRow {
            source: row.get("source"),
            status: row.get("status"),
            dry_run: row.get::<i64, _>("dry_run") != 0,
            started_at: row.get("started_at"),
            total: row.get("total_files"),
            imported: row.get("imported_files"),
            errors: row.get("error_files"),
        })
        .collect();

    if !runs.is_empty() {
        println!();
        println!("  Recent runs:");
        println!(
            "  {:<32} {:<12} {:>6} {:>8} {:>6}   {}",
            "SOURCE", "STATUS", "TOTAL", "IMPORTED", "ERRORS", "STARTED"
        );
        println!("  {}", "-".repeat(84));

        for r in &runs {
            let status = if r.dry_run {
                format!("{}*", r.status)
            } else {
                r.status.clone()
            };
            println!(
                "  {:<32} {:<12} {:>6} {:>8} {:>6}   {}",
                truncate(&r.source, 32),
                status,
                r.total,
                r.imported,
                r.errors,
                format_ts_relative(r.started_at)
            );
        }
        if runs.iter().any(|r| r.dry_run) {
            println!("  (* dry run)");
        }
    }

    println!();

    store.close().await;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
pub fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    match delta {
        d if d < 60 => "just now".to_string(),
        d if d < 3600 => plural(d / 60, "min"),
        d if d < 86400 => plural(d / 3600, "hour"),
        d if d < 86400 * 30 => plural(d / 86400, "day"),
        _ => format_ts_iso(ts),
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 60), "1 min ago");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400 * 3), "3 days ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }

    #[test]
    fn byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn long_sources_are_truncated() {
        assert_eq!(truncate("api:http://kb", 32), "api:http://kb");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }
}
