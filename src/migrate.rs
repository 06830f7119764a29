use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::Result;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contents (
            id TEXT PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL,
            content_type TEXT NOT NULL,
            format TEXT NOT NULL,
            status TEXT NOT NULL,
            is_published INTEGER NOT NULL DEFAULT 0,
            is_premium INTEGER NOT NULL DEFAULT 0,
            difficulty TEXT NOT NULL,
            estimated_time INTEGER NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 3,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            quality_scores_json TEXT NOT NULL DEFAULT '{}',
            content_hash TEXT NOT NULL,
            published_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_translations (
            id TEXT PRIMARY KEY,
            content_id TEXT NOT NULL,
            language TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            body TEXT NOT NULL,
            UNIQUE(content_id, language),
            FOREIGN KEY (content_id) REFERENCES contents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_tags (
            content_id TEXT NOT NULL,
            tag_id TEXT NOT NULL,
            PRIMARY KEY (content_id, tag_id),
            FOREIGN KEY (content_id) REFERENCES contents(id),
            FOREIGN KEY (tag_id) REFERENCES tags(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_runs (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            status TEXT NOT NULL,
            dry_run INTEGER NOT NULL DEFAULT 0,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            total_files INTEGER NOT NULL DEFAULT 0,
            processed_files INTEGER NOT NULL DEFAULT 0,
            imported_files INTEGER NOT NULL DEFAULT 0,
            error_files INTEGER NOT NULL DEFAULT 0,
            error_log TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_items (
            id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            status TEXT NOT NULL,
            content_id TEXT,
            error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (run_id) REFERENCES sync_runs(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one unfinished run per source.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_runs_in_progress ON sync_runs(source) WHERE status = 'IN_PROGRESS'",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_items_run_id ON sync_items(run_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_runs_started_at ON sync_runs(started_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_tags_tag_id ON content_tags(tag_id)")
        .execute(pool)
        .await?;

    Ok(())
}
