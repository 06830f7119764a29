//! Local content store and sync ledger.
//!
//! The [`ContentStore`] trait is everything the orchestrator needs from the
//! relational store: the tag catalog, content lookup, an atomic
//! upsert-by-external-id, and the run/item ledger. [`SqliteStore`] is the
//! SQLite implementation over the schema created by
//! [`migrate`](crate::migrate).
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`list_tags`](ContentStore::list_tags) | Tag catalog snapshot |
//! | [`find_content`](ContentStore::find_content) | Lookup by external id |
//! | [`upsert_content`](ContentStore::upsert_content) | Insert or update content, translations, and tags in one transaction |
//! | [`begin_run`](ContentStore::begin_run) | Open a run; refuses a second unfinished run per source until its lease expires |
//! | [`create_item`](ContentStore::create_item) / [`finish_item`](ContentStore::finish_item) / [`fail_item`](ContentStore::fail_item) | Per-unit ledger |
//! | [`complete_run`](ContentStore::complete_run) / [`fail_run`](ContentStore::fail_run) | Finalize a run |

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::{Config, SyncConfig};
use crate::db;
use crate::error::{Result, SyncError};
use crate::models::{ConvertedContent, StoredContent, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "IN_PROGRESS",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "COMPLETED" => RunStatus::Completed,
            "FAILED" => RunStatus::Failed,
            _ => RunStatus::InProgress,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Processing,
    Imported,
    Updated,
    Error,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Processing => "PROCESSING",
            ItemStatus::Imported => "IMPORTED",
            ItemStatus::Updated => "UPDATED",
            ItemStatus::Error => "ERROR",
        }
    }
}

/// Result of [`ContentStore::upsert_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub content_id: String,
    /// `true` when the row was inserted, `false` when an existing row was updated.
    pub created: bool,
}

/// Aggregate counters written when a run completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub total_files: u64,
    pub processed_files: u64,
    /// Imported plus updated.
    pub imported_files: u64,
    pub error_files: u64,
    /// JSON array of `{file, error}`, present when there were errors.
    pub error_log: Option<String>,
}

/// A ledger row for one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunRecord {
    pub id: String,
    pub source: String,
    pub status: RunStatus,
    pub dry_run: bool,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub total_files: i64,
    pub processed_files: i64,
    pub imported_files: i64,
    pub error_files: i64,
    pub error_log: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemCounts {
    pub total: i64,
    pub synced: i64,
    pub failed: i64,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn list_tags(&self) -> Result<Vec<Tag>>;

    async fn find_content(&self, external_id: &str) -> Result<Option<StoredContent>>;

    /// Insert or update by external id, upsert translations per language,
    /// and replace tag associations, atomically.
    async fn upsert_content(&self, converted: &ConvertedContent) -> Result<UpsertOutcome>;

    /// Open a run. Fails with [`SyncError::RunInProgress`] if the source
    /// already has an unfinished run that is still within its lease; older
    /// unfinished runs are marked failed first.
    async fn begin_run(&self, source: &str, dry_run: bool) -> Result<String>;

    async fn create_item(&self, run_id: &str, file_name: &str) -> Result<String>;

    async fn finish_item(&self, item_id: &str, status: ItemStatus, content_id: &str)
        -> Result<()>;

    async fn fail_item(&self, item_id: &str, error: &str) -> Result<()>;

    async fn complete_run(&self, run_id: &str, totals: &RunTotals) -> Result<()>;

    async fn fail_run(&self, run_id: &str, error: &str) -> Result<()>;
}

/// SQLite implementation of [`ContentStore`].
pub struct SqliteStore {
    pool: SqlitePool,
    run_lease_secs: i64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            run_lease_secs: SyncConfig::default().run_lease_secs as i64,
        }
    }

    pub async fn connect(config: &Config) -> Result<Self> {
        Ok(Self::new(db::connect(config).await?).with_run_lease(config.sync.run_lease_secs))
    }

    /// Unfinished runs older than `secs` are failed by the next
    /// [`begin_run`](ContentStore::begin_run) for the same source.
    pub fn with_run_lease(mut self, secs: u64) -> Self {
        self.run_lease_secs = i64::try_from(secs).unwrap_or(i64::MAX);
        self
    }

    /// Mark unfinished runs as failed, for one source or all of them.
    /// Returns the number of runs released.
    pub async fn reset_runs(&self, source: Option<&str>) -> Result<u64> {
        let log = abandoned_log("reset by operator");
        let done = sqlx::query(
            "UPDATE sync_runs SET status = ?1, completed_at = ?2, error_log = ?3 WHERE status = ?4 AND (?5 IS NULL OR source = ?5)",
        )
        .bind(RunStatus::Failed.as_str())
        .bind(Utc::now().timestamp())
        .bind(log)
        .bind(RunStatus::InProgress.as_str())
        .bind(source)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Add a tag to the catalog. Used for seeding; sync never creates tags.
    pub async fn insert_tag(&self, slug: &str, name: &str) -> Result<Tag> {
        let tag = Tag {
            id: Uuid::new_v4().to_string(),
            slug: slug.to_string(),
            name: name.to_string(),
        };
        sqlx::query("INSERT INTO tags (id, slug, name) VALUES (?, ?, ?)")
            .bind(&tag.id)
            .bind(&tag.slug)
            .bind(&tag.name)
            .execute(&self.pool)
            .await?;
        Ok(tag)
    }

    /// Most recent run, optionally restricted to one source.
    pub async fn latest_run(&self, source: Option<&str>) -> Result<Option<SyncRunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, source, status, dry_run, started_at, completed_at, total_files,
                   processed_files, imported_files, error_files, error_log
            FROM sync_runs
            WHERE (?1 IS NULL OR source = ?1)
            ORDER BY started_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| SyncRunRecord {
            id: row.get("id"),
            source: row.get("source"),
            status: RunStatus::parse(row.get::<String, _>("status").as_str()),
            dry_run: row.get::<i64, _>("dry_run") != 0,
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            total_files: row.get("total_files"),
            processed_files: row.get("processed_files"),
            imported_files: row.get("imported_files"),
            error_files: row.get("error_files"),
            error_log: row.get("error_log"),
        }))
    }

    pub async fn item_counts(&self) -> Result<ItemCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status IN ('IMPORTED', 'UPDATED') THEN 1 ELSE 0 END), 0) AS synced,
                COALESCE(SUM(CASE WHEN status = 'ERROR' THEN 1 ELSE 0 END), 0) AS failed
            FROM sync_items
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ItemCounts {
            total: row.get("total"),
            synced: row.get("synced"),
            failed: row.get("failed"),
        })
    }

    /// Number of rows in a table. Only the fixed table names below are accepted.
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = match table {
            "contents" => "SELECT COUNT(*) FROM contents",
            "content_translations" => "SELECT COUNT(*) FROM content_translations",
            "content_tags" => "SELECT COUNT(*) FROM content_tags",
            "tags" => "SELECT COUNT(*) FROM tags",
            "sync_runs" => "SELECT COUNT(*) FROM sync_runs",
            "sync_items" => "SELECT COUNT(*) FROM sync_items",
            other => {
                return Err(SyncError::InvalidRequest(format!(
                    "unknown table: {}",
                    other
                )))
            }
        };
        Ok(sqlx::query_scalar(sql).fetch_one(&self.pool).await?)
    }
}

fn abandoned_log(reason: &str) -> String {
    serde_json::json!([{ "file": "*", "error": reason }]).to_string()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn list_tags(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT id, slug, name FROM tags ORDER BY slug ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| Tag {
                id: row.get("id"),
                slug: row.get("slug"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn find_content(&self, external_id: &str) -> Result<Option<StoredContent>> {
        let row = sqlx::query(
            r#"
            SELECT id, external_id, slug, content_type, is_premium, difficulty,
                   estimated_time, content_hash, updated_at
            FROM contents WHERE external_id = ?
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| StoredContent {
            id: row.get("id"),
            external_id: row.get("external_id"),
            slug: row.get("slug"),
            content_type: row.get("content_type"),
            is_premium: row.get::<i64, _>("is_premium") != 0,
            difficulty: row.get("difficulty"),
            estimated_time: row.get("estimated_time"),
            content_hash: row.get("content_hash"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn upsert_content(&self, converted: &ConvertedContent) -> Result<UpsertOutcome> {
        let c = &converted.content;
        let now = Utc::now().timestamp();
        let candidate_id = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;

        let content_id: String = sqlx::query_scalar(
            r#"
            INSERT INTO contents (id, external_id, slug, content_type, format, status,
                                  is_published, is_premium, difficulty, estimated_time,
                                  sort_order, metadata_json, quality_scores_json,
                                  content_hash, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                slug = excluded.slug,
                content_type = excluded.content_type,
                format = excluded.format,
                status = excluded.status,
                is_published = excluded.is_published,
                is_premium = excluded.is_premium,
                difficulty = excluded.difficulty,
                estimated_time = excluded.estimated_time,
                sort_order = excluded.sort_order,
                metadata_json = excluded.metadata_json,
                quality_scores_json = excluded.quality_scores_json,
                content_hash = excluded.content_hash,
                published_at = excluded.published_at,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&candidate_id)
        .bind(&c.external_id)
        .bind(&c.slug)
        .bind(c.content_type.as_str())
        .bind(&c.format)
        .bind(c.status.as_str())
        .bind(c.is_published)
        .bind(c.is_premium)
        .bind(c.difficulty.as_str())
        .bind(c.estimated_time as i64)
        .bind(c.sort_order)
        .bind(&c.metadata_json)
        .bind(&c.quality_scores_json)
        .bind(&c.content_hash)
        .bind(c.published_at.map(|t| t.timestamp()))
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for t in &converted.translations {
            sqlx::query(
                r#"
                INSERT INTO content_translations (id, content_id, language, title, description, body)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(content_id, language) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    body = excluded.body
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&content_id)
            .bind(&t.language)
            .bind(&t.title)
            .bind(&t.description)
            .bind(&t.body)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM content_tags WHERE content_id = ?")
            .bind(&content_id)
            .execute(&mut *tx)
            .await?;
        for tag_id in &converted.tag_ids {
            sqlx::query("INSERT OR IGNORE INTO content_tags (content_id, tag_id) VALUES (?, ?)")
                .bind(&content_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(UpsertOutcome {
            created: content_id == candidate_id,
            content_id,
        })
    }

    async fn begin_run(&self, source: &str, dry_run: bool) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let expired = sqlx::query(
            "UPDATE sync_runs SET status = ?, completed_at = ?, error_log = ? WHERE source = ? AND status = ? AND started_at <= ?",
        )
        .bind(RunStatus::Failed.as_str())
        .bind(now)
        .bind(abandoned_log("run lease expired"))
        .bind(source)
        .bind(RunStatus::InProgress.as_str())
        .bind(now.saturating_sub(self.run_lease_secs))
        .execute(&mut *tx)
        .await?;
        if expired.rows_affected() > 0 {
            tracing::warn!(
                source,
                runs = expired.rows_affected(),
                "released abandoned sync run"
            );
        }

        let result = sqlx::query(
            "INSERT INTO sync_runs (id, source, status, dry_run, started_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(source)
        .bind(RunStatus::InProgress.as_str())
        .bind(dry_run)
        .bind(now)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(id)
            }
            Err(e) if is_unique_violation(&e) => Err(SyncError::RunInProgress {
                source_label: source.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_item(&self, run_id: &str, file_name: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO sync_items (id, run_id, file_name, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(run_id)
        .bind(file_name)
        .bind(ItemStatus::Processing.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn finish_item(
        &self,
        item_id: &str,
        status: ItemStatus,
        content_id: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE sync_items SET status = ?, content_id = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(content_id)
            .bind(Utc::now().timestamp())
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail_item(&self, item_id: &str, error: &str) -> Result<()> {
        sqlx::query("UPDATE sync_items SET status = ?, error = ?, updated_at = ? WHERE id = ?")
            .bind(ItemStatus::Error.as_str())
            .bind(error)
            .bind(Utc::now().timestamp())
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn complete_run(&self, run_id: &str, totals: &RunTotals) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_runs SET
                status = ?, completed_at = ?, total_files = ?, processed_files = ?,
                imported_files = ?, error_files = ?, error_log = ?
            WHERE id = ?
            "#,
        )
        .bind(RunStatus::Completed.as_str())
        .bind(Utc::now().timestamp())
        .bind(totals.total_files as i64)
        .bind(totals.processed_files as i64)
        .bind(totals.imported_files as i64)
        .bind(totals.error_files as i64)
        .bind(&totals.error_log)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_run(&self, run_id: &str, error: &str) -> Result<()> {
        let log = abandoned_log(error);
        sqlx::query("UPDATE sync_runs SET status = ?, completed_at = ?, error_log = ? WHERE id = ?")
            .bind(RunStatus::Failed.as_str())
            .bind(Utc::now().timestamp())
            .bind(log)
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
