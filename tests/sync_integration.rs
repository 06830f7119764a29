//! Orchestrator tests against a temp-dir SQLite store and an in-memory
//! theme source.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use kbsync::config::Config;
use kbsync::error::{Result, SyncError};
use kbsync::migrate;
use kbsync::models::{
    ContentMetadata, ConvertedContent, Format, LocalizedTitle, Priority, RemoteContent,
    StoredContent, Tag, Theme, ThemeDetail,
};
use kbsync::source::ThemeSource;
use kbsync::store::{
    ContentStore, ItemStatus, RunStatus, RunTotals, SqliteStore, UpsertOutcome,
};
use kbsync::sync::{run_sync, SyncOptions};
use kbsync::trigger::{ledger_status, run_trigger, TriggerRequest};

// ═══════════════════════════════════════════════════════════════════════
// In-memory source
// ═══════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct MemorySource {
    label: String,
    themes: Vec<ThemeDetail>,
    contents: HashMap<(String, String, String), RemoteContent>,
    fail_listing: bool,
    fail_detail: HashSet<String>,
}

impl MemorySource {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    /// Add a theme whose formats are `(code, lang, status)`; every format gets
    /// a content body.
    fn theme(mut self, theme_id: &str, formats: &[(&str, &str, &str)]) -> Self {
        self.themes.push(ThemeDetail {
            theme: Theme {
                theme_id: theme_id.to_string(),
                title: LocalizedTitle {
                    ua: format!("Theme {}", theme_id),
                    ..Default::default()
                },
                has_mastertext: true,
                ..Default::default()
            },
            formats: formats
                .iter()
                .map(|(code, lang, status)| Format {
                    format_code: code.to_string(),
                    lang: lang.to_string(),
                    status: status.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        });
        for (code, lang, status) in formats {
            self.contents.insert(
                key(theme_id, code, lang),
                content(theme_id, code, lang, status),
            );
        }
        self
    }

    fn edit_content(mut self, theme_id: &str, code: &str, lang: &str, f: impl FnOnce(&mut RemoteContent)) -> Self {
        if let Some(c) = self.contents.get_mut(&key(theme_id, code, lang)) {
            f(c);
        }
        self
    }

    fn edit_theme(mut self, theme_id: &str, f: impl FnOnce(&mut ThemeDetail)) -> Self {
        if let Some(t) = self.themes.iter_mut().find(|t| t.theme.theme_id == theme_id) {
            f(t);
        }
        self
    }
}

fn key(theme_id: &str, code: &str, lang: &str) -> (String, String, String) {
    (theme_id.to_string(), code.to_string(), lang.to_string())
}

fn content(theme_id: &str, code: &str, lang: &str, status: &str) -> RemoteContent {
    RemoteContent {
        theme_id: theme_id.to_string(),
        format: code.to_lowercase(),
        format_code: code.to_string(),
        lang: lang.to_string(),
        title: format!("{} {} {}", theme_id, code, lang),
        content: format!("# {}\n\nBody of {} in {}.", theme_id, code, lang),
        metadata: ContentMetadata {
            status: status.to_string(),
            word_count: Some(400),
            ..Default::default()
        },
        file_info: None,
    }
}

#[async_trait]
impl ThemeSource for MemorySource {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn list_themes(&self, limit: usize) -> Result<Vec<Theme>> {
        if self.fail_listing {
            return Err(SyncError::Remote {
                status: Some(503),
                message: "Service Unavailable".to_string(),
            });
        }
        Ok(self
            .themes
            .iter()
            .map(|t| t.theme.clone())
            .take(limit)
            .collect())
    }

    async fn theme_detail(&self, theme_id: &str) -> Result<ThemeDetail> {
        if self.fail_detail.contains(theme_id) {
            return Err(SyncError::Remote {
                status: Some(500),
                message: "detail exploded".to_string(),
            });
        }
        self.themes
            .iter()
            .find(|t| t.theme.theme_id == theme_id)
            .cloned()
            .ok_or_else(|| SyncError::Remote {
                status: Some(404),
                message: "Theme not found".to_string(),
            })
    }

    async fn content(&self, theme_id: &str, format_code: &str, lang: &str) -> Result<RemoteContent> {
        self.contents
            .get(&key(theme_id, format_code, lang))
            .cloned()
            .ok_or_else(|| SyncError::Remote {
                status: Some(404),
                message: "Content not found".to_string(),
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Store helpers
// ═══════════════════════════════════════════════════════════════════════

fn store_config(tmp: &TempDir) -> Config {
    Config::with_db(tmp.path().join("data").join("kbsync.sqlite"))
}

async fn setup_store() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::connect(&store_config(&tmp)).await.unwrap();
    migrate::migrate_pool(store.pool()).await.unwrap();
    (tmp, store)
}

async fn count(store: &SqliteStore, table: &str) -> i64 {
    store.count_rows(table).await.unwrap()
}

async fn item_statuses(store: &SqliteStore) -> Vec<(String, String)> {
    sqlx::query_as("SELECT file_name, status FROM sync_items ORDER BY file_name")
        .fetch_all(store.pool())
        .await
        .unwrap()
}

fn two_themes() -> MemorySource {
    MemorySource::new("memory:test")
        .theme("theme_a", &[("M", "uk", "done"), ("T", "uk", "draft")])
        .theme("theme_b", &[("M", "en", "done")])
}

fn opts() -> SyncOptions {
    SyncOptions::default()
}

// ═══════════════════════════════════════════════════════════════════════
// Scenarios
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn two_theme_scenario_imports_ready_formats() {
    let (_tmp, store) = setup_store().await;
    let source = two_themes();

    let result = run_sync(&source, &store, &opts(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.total_files, 3);
    assert_eq!(result.processed_files, 2);
    assert_eq!(result.imported_files, 2);
    assert_eq!(result.updated_files, 0);
    assert_eq!(result.skipped_files, 1);
    assert_eq!(result.error_files, 0);
    assert!(result.errors.is_empty());

    assert_eq!(count(&store, "contents").await, 2);
    assert_eq!(count(&store, "content_translations").await, 2);
    assert_eq!(
        item_statuses(&store).await,
        vec![
            ("theme_a/M-uk".to_string(), "IMPORTED".to_string()),
            ("theme_b/M-en".to_string(), "IMPORTED".to_string()),
        ]
    );

    let a = store.find_content("theme_a_m_uk").await.unwrap().unwrap();
    assert_eq!(a.slug, "theme_a-m");
    assert_eq!(a.content_type, "ARTICLE");
    assert_eq!(a.difficulty, "ADVANCED");
    assert!(a.is_premium, "master text is premium");
    assert_eq!(a.estimated_time, 2);
    assert!(store.find_content("theme_a_t_uk").await.unwrap().is_none());

    let run = store.latest_run(Some("memory:test")).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(!run.dry_run);
    assert_eq!(run.total_files, 3);
    assert_eq!(run.processed_files, 2);
    assert_eq!(run.imported_files, 2);
    assert_eq!(run.error_files, 0);
    assert!(run.error_log.is_none());
    assert!(run.completed_at.is_some());
}

#[tokio::test]
async fn second_run_skips_existing_content() {
    let (_tmp, store) = setup_store().await;
    let source = two_themes();
    let cancel = CancellationToken::new();

    run_sync(&source, &store, &opts(), &cancel).await.unwrap();
    let before: StoredContent = store.find_content("theme_b_m_en").await.unwrap().unwrap();

    let result = run_sync(&source, &store, &opts(), &cancel).await.unwrap();
    assert_eq!(result.processed_files, 0);
    assert_eq!(result.imported_files, 0);
    assert_eq!(result.skipped_files, 3);
    assert_eq!(result.error_files, 0);

    assert_eq!(count(&store, "contents").await, 2);
    assert_eq!(count(&store, "content_translations").await, 2);
    assert_eq!(count(&store, "sync_runs").await, 2);
    let after = store.find_content("theme_b_m_en").await.unwrap().unwrap();
    assert_eq!(before.id, after.id);
    assert_eq!(before.updated_at, after.updated_at);
}

#[tokio::test]
async fn existing_content_is_matched_by_id_not_by_hash() {
    let (_tmp, store) = setup_store().await;
    let cancel = CancellationToken::new();
    run_sync(&two_themes(), &store, &opts(), &cancel).await.unwrap();
    let before = store.find_content("theme_a_m_uk").await.unwrap().unwrap();

    let edited = two_themes().edit_content("theme_a", "M", "uk", |c| {
        c.content = "Rewritten upstream.".to_string();
    });
    let result = run_sync(&edited, &store, &opts(), &cancel).await.unwrap();
    assert_eq!(result.updated_files, 0);
    assert_eq!(result.skipped_files, 3);
    let after = store.find_content("theme_a_m_uk").await.unwrap().unwrap();
    assert_eq!(before.content_hash, after.content_hash);

    let forced = SyncOptions {
        force_update: true,
        ..opts()
    };
    let result = run_sync(&two_themes(), &store, &forced, &cancel).await.unwrap();
    assert_eq!(result.updated_files, 2, "identical bodies are still rewritten");
    let again = store.find_content("theme_a_m_uk").await.unwrap().unwrap();
    assert_eq!(before.content_hash, again.content_hash);
}

#[tokio::test]
async fn force_update_rewrites_in_place() {
    let (_tmp, store) = setup_store().await;
    let cancel = CancellationToken::new();
    run_sync(&two_themes(), &store, &opts(), &cancel).await.unwrap();
    let before = store.find_content("theme_a_m_uk").await.unwrap().unwrap();

    let edited = two_themes().edit_content("theme_a", "M", "uk", |c| {
        c.content = "A much longer body now.".to_string();
        c.metadata.word_count = Some(1000);
    });
    let forced = SyncOptions {
        force_update: true,
        ..opts()
    };
    let result = run_sync(&edited, &store, &forced, &cancel).await.unwrap();

    assert_eq!(result.processed_files, 2);
    assert_eq!(result.updated_files, 2);
    assert_eq!(result.imported_files, 0);
    assert_eq!(result.skipped_files, 1);

    let after = store.find_content("theme_a_m_uk").await.unwrap().unwrap();
    assert_eq!(before.id, after.id);
    assert_eq!(after.estimated_time, 5);
    assert_ne!(before.content_hash, after.content_hash);
    assert_eq!(count(&store, "contents").await, 2);
    assert_eq!(count(&store, "content_translations").await, 2);

    let body: String = sqlx::query_scalar(
        "SELECT body FROM content_translations WHERE content_id = ? AND language = 'UA'",
    )
    .bind(&after.id)
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(body, "A much longer body now.");

    let run = store.latest_run(None).await.unwrap().unwrap();
    assert_eq!(run.imported_files, 2, "ledger counts imports and updates together");
}

#[tokio::test]
async fn dry_run_writes_no_content() {
    let (_tmp, store) = setup_store().await;
    let dry = SyncOptions {
        dry_run: true,
        ..opts()
    };

    let result = run_sync(&two_themes(), &store, &dry, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.processed_files, 2);
    assert_eq!(result.imported_files, 0);
    assert_eq!(result.skipped_files, 1);
    assert_eq!(count(&store, "contents").await, 0);
    assert_eq!(count(&store, "content_translations").await, 0);
    assert_eq!(count(&store, "content_tags").await, 0);
    assert_eq!(count(&store, "sync_items").await, 0);

    let run = store.latest_run(None).await.unwrap().unwrap();
    assert!(run.dry_run);
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn filters_narrow_the_run() {
    let (_tmp, store) = setup_store().await;
    let source = two_themes().theme("theme_c", &[("IG", "en", "done"), ("PODCAST", "en", "done")]);
    let filtered = SyncOptions {
        format: Some("master".to_string()),
        language: Some("EN".to_string()),
        ..opts()
    };

    let result = run_sync(&source, &store, &filtered, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.total_files, 1);
    assert_eq!(result.imported_files, 1);
    assert!(store.find_content("theme_b_m_en").await.unwrap().is_some());

    let result = run_sync(&source, &store, &opts(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.total_files, 4, "unsupported formats are never units");
    assert_eq!(result.imported_files, 2);
}

#[tokio::test]
async fn limit_caps_listed_themes() {
    let (_tmp, store) = setup_store().await;
    let limited = SyncOptions { limit: 1, ..opts() };

    let result = run_sync(&two_themes(), &store, &limited, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.total_files, 2);
    assert_eq!(result.imported_files, 1);
}

#[tokio::test]
async fn unit_failures_do_not_stop_the_run() {
    let (_tmp, store) = setup_store().await;
    let mut source = two_themes()
        .theme("theme_c", &[("M", "en", "done"), ("T", "en", "done")])
        .edit_content("theme_c", "M", "en", |c| c.metadata.word_count = None);
    source.contents.remove(&key("theme_c", "T", "en"));
    source.fail_detail.insert("theme_b".to_string());

    let result = run_sync(&source, &store, &opts(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.imported_files, 1);
    assert_eq!(result.skipped_files, 1);
    assert_eq!(result.error_files, 3);
    assert_eq!(result.total_files, 5);

    let files: Vec<&str> = result.errors.iter().map(|e| e.file.as_str()).collect();
    assert_eq!(files, vec!["theme_b", "theme_c/M-en", "theme_c/T-en"]);
    assert!(result.errors[0].error.contains("detail exploded"));
    assert!(result.errors[1].error.contains("word_count"));
    assert!(result.errors[2].error.contains("Content not found"));

    assert!(store.find_content("theme_a_m_uk").await.unwrap().is_some());
    let run = store.latest_run(None).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.error_files, 3);
    assert!(run.error_log.unwrap().contains("theme_c/T-en"));
}

#[tokio::test]
async fn listing_failure_fails_the_run() {
    let (_tmp, store) = setup_store().await;
    let mut source = two_themes();
    source.fail_listing = true;

    let err = run_sync(&source, &store, &opts(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ThemeListing(_)));
    assert!(err.to_string().contains("Service Unavailable"));

    let run = store.latest_run(None).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.completed_at.is_some());
    assert_eq!(count(&store, "contents").await, 0);

    // A source with no themes is a successful empty run, not a failure.
    let empty = MemorySource::new("memory:test");
    let result = run_sync(&empty, &store, &opts(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.total_files, 0);
    let run = store.latest_run(None).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn concurrent_run_for_same_source_is_refused() {
    let (_tmp, store) = setup_store().await;
    let held = store.begin_run("memory:test", false).await.unwrap();

    let err = run_sync(&two_themes(), &store, &opts(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RunInProgress { ref source_label } if source_label == "memory:test"));
    assert_eq!(count(&store, "contents").await, 0);

    let other = MemorySource::new("memory:other").theme("theme_z", &[("M", "en", "done")]);
    let result = run_sync(&other, &store, &opts(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.imported_files, 1);

    store.complete_run(&held, &RunTotals::default()).await.unwrap();
    run_sync(&two_themes(), &store, &opts(), &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn abandoned_run_is_released_once_its_lease_expires() {
    let (tmp, store) = setup_store().await;
    let crashed = store.begin_run("memory:test", false).await.unwrap();
    store.close().await;

    // A restart inside the lease still sees the run as live.
    let store = SqliteStore::connect(&store_config(&tmp)).await.unwrap();
    let err = run_sync(&two_themes(), &store, &opts(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RunInProgress { .. }));

    sqlx::query("UPDATE sync_runs SET started_at = started_at - 7200 WHERE id = ?")
        .bind(&crashed)
        .execute(store.pool())
        .await
        .unwrap();
    store.close().await;

    let store = SqliteStore::connect(&store_config(&tmp)).await.unwrap();
    let result = run_sync(&two_themes(), &store, &opts(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.imported_files, 2);

    let (status, error_log): (String, Option<String>) =
        sqlx::query_as("SELECT status, error_log FROM sync_runs WHERE id = ?")
            .bind(&crashed)
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(status, "FAILED");
    assert!(error_log.unwrap().contains("lease expired"));
    assert!(!ledger_status(&store).await.unwrap().is_running);
}

#[tokio::test]
async fn short_lease_is_read_from_config() {
    let tmp = TempDir::new().unwrap();
    let mut config = store_config(&tmp);
    config.sync.run_lease_secs = 1;
    let store = SqliteStore::connect(&config).await.unwrap();
    migrate::migrate_pool(store.pool()).await.unwrap();

    store.begin_run("memory:test", false).await.unwrap();
    sqlx::query("UPDATE sync_runs SET started_at = started_at - 5")
        .execute(store.pool())
        .await
        .unwrap();

    run_sync(&two_themes(), &store, &opts(), &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn reset_runs_releases_only_the_named_source() {
    let (_tmp, store) = setup_store().await;
    store.begin_run("memory:test", false).await.unwrap();
    store.begin_run("memory:other", false).await.unwrap();

    assert_eq!(store.reset_runs(Some("memory:test")).await.unwrap(), 1);
    run_sync(&two_themes(), &store, &opts(), &CancellationToken::new())
        .await
        .unwrap();

    let err = store.begin_run("memory:other", false).await.unwrap_err();
    assert!(matches!(err, SyncError::RunInProgress { .. }));
    assert_eq!(store.reset_runs(None).await.unwrap(), 1);
    assert_eq!(store.reset_runs(None).await.unwrap(), 0);
}

#[tokio::test]
async fn cancelled_run_is_marked_failed() {
    let (_tmp, store) = setup_store().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = run_sync(&two_themes(), &store, &opts(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));

    let run = store.latest_run(None).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_log.unwrap().contains("cancelled"));
    assert_eq!(count(&store, "contents").await, 0);
}

/// Lists and describes themes normally, but content requests never resolve.
struct StalledSource(MemorySource);

#[async_trait]
impl ThemeSource for StalledSource {
    fn label(&self) -> String {
        self.0.label()
    }

    async fn list_themes(&self, limit: usize) -> Result<Vec<Theme>> {
        self.0.list_themes(limit).await
    }

    async fn theme_detail(&self, theme_id: &str) -> Result<ThemeDetail> {
        self.0.theme_detail(theme_id).await
    }

    async fn content(&self, _theme_id: &str, _format_code: &str, _lang: &str) -> Result<RemoteContent> {
        std::future::pending().await
    }
}

fn cancel_after(millis: u64) -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        trigger.cancel();
    });
    cancel
}

#[tokio::test]
async fn cancellation_interrupts_a_stalled_fetch() {
    let (_tmp, store) = setup_store().await;
    let source = StalledSource(two_themes());
    let cancel = cancel_after(100);

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        run_sync(&source, &store, &opts(), &cancel),
    )
    .await
    .expect("run_sync returns once cancelled");
    assert!(matches!(outcome, Err(SyncError::Cancelled)));

    let run = store.latest_run(None).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_log.unwrap().contains("cancelled"));
    assert_eq!(count(&store, "sync_items").await, 0);
    assert_eq!(count(&store, "contents").await, 0);
}

#[tokio::test]
async fn cancellation_interrupts_a_stalled_write() {
    let (_tmp, inner) = setup_store().await;
    let store = FlakyStore {
        inner,
        poisoned: "theme_a_m_uk".to_string(),
        stall: true,
    };
    let cancel = cancel_after(100);

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        run_sync(&two_themes(), &store, &opts(), &cancel),
    )
    .await
    .expect("run_sync returns once cancelled");
    assert!(matches!(outcome, Err(SyncError::Cancelled)));

    assert_eq!(
        item_statuses(&store.inner).await,
        vec![("theme_a/M-uk".to_string(), "ERROR".to_string())]
    );
    assert_eq!(count(&store.inner, "contents").await, 0);
    let run = store.inner.latest_run(None).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test]
async fn tags_link_only_to_existing_catalog_entries() {
    let (_tmp, store) = setup_store().await;
    let road = store.insert_tag("road-safety", "Road Safety").await.unwrap();
    store.insert_tag("gear", "Gear").await.unwrap();

    let source = MemorySource::new("memory:test")
        .theme("theme_a", &[("M", "uk", "done")])
        .edit_content("theme_a", "M", "uk", |c| {
            c.metadata.tags = vec!["Road Safety".to_string(), "Brand New Tag".to_string()];
        });

    run_sync(&source, &store, &opts(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(count(&store, "tags").await, 2, "sync never creates tags");
    let linked: Vec<String> = sqlx::query_scalar("SELECT tag_id FROM content_tags")
        .fetch_all(store.pool())
        .await
        .unwrap();
    assert_eq!(linked, vec![road.id]);
}

#[tokio::test]
async fn cornerstone_themes_are_premium() {
    let (_tmp, store) = setup_store().await;
    let source = MemorySource::new("memory:test")
        .theme("theme_a", &[("TW", "en", "done")])
        .theme("theme_b", &[("TW", "en", "done")])
        .edit_theme("theme_a", |t| {
            t.theme.is_cornerstone = true;
            t.theme.knowledge_type = "cornerstone".to_string();
        })
        .edit_theme("theme_b", |t| t.theme.priority = Priority::Low);

    run_sync(&source, &store, &opts(), &CancellationToken::new())
        .await
        .unwrap();

    let a = store.find_content("theme_a_tw_en").await.unwrap().unwrap();
    assert!(a.is_premium);
    assert_eq!(a.difficulty, "ADVANCED");
    let b = store.find_content("theme_b_tw_en").await.unwrap().unwrap();
    assert!(!b.is_premium);
    assert_eq!(b.difficulty, "BEGINNER");
}

// ═══════════════════════════════════════════════════════════════════════
// Persistence failures
// ═══════════════════════════════════════════════════════════════════════

/// Delegates to a real store but refuses to upsert one external id, or
/// stalls on it forever when `stall` is set.
struct FlakyStore {
    inner: SqliteStore,
    poisoned: String,
    stall: bool,
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn list_tags(&self) -> Result<Vec<Tag>> {
        self.inner.list_tags().await
    }

    async fn find_content(&self, external_id: &str) -> Result<Option<StoredContent>> {
        self.inner.find_content(external_id).await
    }

    async fn upsert_content(&self, converted: &ConvertedContent) -> Result<UpsertOutcome> {
        if converted.content.external_id == self.poisoned {
            if self.stall {
                return std::future::pending().await;
            }
            return Err(SyncError::Persistence(sqlx::Error::Protocol(
                "disk full".to_string(),
            )));
        }
        self.inner.upsert_content(converted).await
    }

    async fn begin_run(&self, source: &str, dry_run: bool) -> Result<String> {
        self.inner.begin_run(source, dry_run).await
    }

    async fn create_item(&self, run_id: &str, file_name: &str) -> Result<String> {
        self.inner.create_item(run_id, file_name).await
    }

    async fn finish_item(&self, item_id: &str, status: ItemStatus, content_id: &str) -> Result<()> {
        self.inner.finish_item(item_id, status, content_id).await
    }

    async fn fail_item(&self, item_id: &str, error: &str) -> Result<()> {
        self.inner.fail_item(item_id, error).await
    }

    async fn complete_run(&self, run_id: &str, totals: &RunTotals) -> Result<()> {
        self.inner.complete_run(run_id, totals).await
    }

    async fn fail_run(&self, run_id: &str, error: &str) -> Result<()> {
        self.inner.fail_run(run_id, error).await
    }
}

#[tokio::test]
async fn persistence_failure_marks_only_that_item() {
    let (_tmp, inner) = setup_store().await;
    let store = FlakyStore {
        inner,
        poisoned: "theme_a_m_uk".to_string(),
        stall: false,
    };

    let result = run_sync(&two_themes(), &store, &opts(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.imported_files, 1);
    assert_eq!(result.error_files, 1);
    assert_eq!(result.errors[0].file, "theme_a/M-uk");
    assert!(result.errors[0].error.contains("disk full"));

    assert_eq!(
        item_statuses(&store.inner).await,
        vec![
            ("theme_a/M-uk".to_string(), "ERROR".to_string()),
            ("theme_b/M-en".to_string(), "IMPORTED".to_string()),
        ]
    );
    let status = ledger_status(&store.inner).await.unwrap();
    assert_eq!(status.total_items, 2);
    assert_eq!(status.synced_items, 1);
    assert_eq!(status.failed_items, 1);
    assert!(!status.is_running);
    assert!(status.last_sync.is_some());
}

// ═══════════════════════════════════════════════════════════════════════
// Trigger
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn trigger_validates_before_running() {
    let (_tmp, store) = setup_store().await;
    let request: TriggerRequest = serde_json::from_str(r#"{"format":"XX"}"#).unwrap();

    let err = run_trigger(&two_themes(), &store, request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidRequest(_)));
    assert_eq!(count(&store, "sync_runs").await, 0);
}

#[tokio::test]
async fn trigger_reports_camel_case_summary() {
    let (_tmp, store) = setup_store().await;
    let request: TriggerRequest =
        serde_json::from_str(r#"{"format":"ALL","language":"ALL","dryRun":true}"#).unwrap();

    let response = run_trigger(&two_themes(), &store, request, &CancellationToken::new())
        .await
        .unwrap();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["success"], true);
    assert_eq!(json["dryRun"], true);
    assert_eq!(json["result"]["processedFiles"], 2);
    assert_eq!(json["result"]["skippedFiles"], 1);
    assert_eq!(json["result"]["errors"], 0);
    assert!(json["result"]["errorDetails"].as_array().unwrap().is_empty());
}
