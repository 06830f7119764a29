//! Sync orchestrator.
//!
//! One run walks every theme the source lists, every supported format of
//! each theme, and imports or updates the matching local content:
//!
//! ```text
//! begin_run ─▶ list_themes ─▶ for theme: theme_detail ─▶ for format:
//!     status gate ─▶ content ─▶ find_content ─▶ convert ─▶ upsert
//! ─▶ fold(reports) ─▶ complete_run
//! ```
//!
//! Every unit produces a [`UnitReport`]; failures are captured per unit and
//! never abort the run. The run counters are a pure [`fold`] over those
//! reports. Only a failure to list themes, a run already in progress, or
//! cancellation end the run early.

use std::future::Future;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::convert::{self, convert_content, external_id};
use crate::error::{Result, SyncError};
use crate::models::{Format, Tag, ThemeDetail};
use crate::source::ThemeSource;
use crate::store::{ContentStore, ItemStatus, RunTotals};

/// Options for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Only sync this format (code or long name). `None` syncs all.
    pub format: Option<String>,
    /// Only sync this language, case-insensitive. `None` syncs all.
    pub language: Option<String>,
    /// Update content that already exists locally.
    pub force_update: bool,
    /// Convert and report without writing content or items.
    pub dry_run: bool,
    /// Maximum number of themes to list.
    pub limit: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            format: None,
            language: None,
            force_update: false,
            dry_run: false,
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Format lifecycle status is not `done`/`published`.
    Status(String),
    /// Content exists locally and `force_update` is off.
    Existing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Imported,
    Updated,
    Skipped(SkipReason),
    DryRun { would_update: bool },
    Failed(String),
}

/// What happened to one unit of work, keyed `theme/FORMAT-lang`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub file: String,
    pub outcome: UnitOutcome,
}

impl UnitReport {
    fn new(file: impl Into<String>, outcome: UnitOutcome) -> Self {
        Self {
            file: file.into(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub total_files: u64,
    pub processed_files: u64,
    pub imported_files: u64,
    pub updated_files: u64,
    pub skipped_files: u64,
    pub error_files: u64,
    pub errors: Vec<FileError>,
}

/// Aggregate unit reports into run counters.
///
/// `processed` counts imports, updates, and dry-run previews; `skipped`
/// counts both skip reasons; `total` is their sum plus errors.
pub fn fold(reports: &[UnitReport]) -> SyncResult {
    reports
        .iter()
        .fold(SyncResult::default(), |mut acc, report| {
            acc.total_files += 1;
            match &report.outcome {
                UnitOutcome::Imported => {
                    acc.processed_files += 1;
                    acc.imported_files += 1;
                }
                UnitOutcome::Updated => {
                    acc.processed_files += 1;
                    acc.updated_files += 1;
                }
                UnitOutcome::DryRun { .. } => acc.processed_files += 1,
                UnitOutcome::Skipped(_) => acc.skipped_files += 1,
                UnitOutcome::Failed(message) => {
                    acc.error_files += 1;
                    acc.errors.push(FileError {
                        file: report.file.clone(),
                        error: message.clone(),
                    });
                }
            }
            acc
        })
}

impl SyncResult {
    fn totals(&self) -> RunTotals {
        RunTotals {
            total_files: self.total_files,
            processed_files: self.processed_files,
            imported_files: self.imported_files + self.updated_files,
            error_files: self.error_files,
            error_log: if self.errors.is_empty() {
                None
            } else {
                serde_json::to_string(&self.errors).ok()
            },
        }
    }
}

fn unit_key(theme_id: &str, format: &Format) -> String {
    format!("{}/{}-{}", theme_id, format.format_code, format.lang)
}

/// Formats of `theme` that pass the run's filters and the supported-format
/// whitelist, in listed order.
fn selected_formats<'a>(theme: &'a ThemeDetail, opts: &SyncOptions) -> Vec<&'a Format> {
    let format_filter = opts.format.as_deref().map(convert::normalize_format);
    theme
        .formats
        .iter()
        .filter(|f| {
            format_filter
                .as_deref()
                .map_or(true, |wanted| f.format_code == wanted)
        })
        .filter(|f| {
            opts.language
                .as_deref()
                .map_or(true, |wanted| f.lang.eq_ignore_ascii_case(wanted))
        })
        .filter(|f| convert::is_supported_format(&f.format_code))
        .collect()
}

/// Run one sync from `source` into `store`.
///
/// # Errors
///
/// - [`SyncError::RunInProgress`] if `source` already has an unfinished run.
/// - [`SyncError::ThemeListing`] if the theme list cannot be fetched; the
///   run is recorded as failed.
/// - [`SyncError::Cancelled`] if `cancel` fires; the pending source or store
///   call is abandoned, the run is recorded as failed, and remaining units
///   are not started.
///
/// Per-unit failures are reported in [`SyncResult::errors`] instead.
pub async fn run_sync(
    source: &dyn ThemeSource,
    store: &dyn ContentStore,
    opts: &SyncOptions,
    cancel: &CancellationToken,
) -> Result<SyncResult> {
    let label = source.label();
    let tags = store.list_tags().await?;
    let run_id = store.begin_run(&label, opts.dry_run).await?;
    info!(source = %label, run_id = %run_id, dry_run = opts.dry_run, "sync started");

    let ctx = RunContext {
        source,
        store,
        run_id: &run_id,
        tags: &tags,
        opts,
        cancel,
    };

    let finished = async {
        let result = fold(&ctx.run_units().await?);
        store.complete_run(&run_id, &result.totals()).await?;
        Ok::<_, SyncError>(result)
    }
    .await;

    match finished {
        Ok(result) => {
            info!(
                source = %label,
                total = result.total_files,
                processed = result.processed_files,
                imported = result.imported_files,
                updated = result.updated_files,
                skipped = result.skipped_files,
                errors = result.error_files,
                "sync completed"
            );
            Ok(result)
        }
        Err(err) => {
            error!(source = %label, run_id = %run_id, error = %err, "sync failed");
            if let Err(mark_err) = store.fail_run(&run_id, &err.to_string()).await {
                warn!(run_id = %run_id, error = %mark_err, "could not mark run as failed");
            }
            Err(err)
        }
    }
}

/// Borrowed state shared by every unit of one run.
struct RunContext<'a> {
    source: &'a dyn ThemeSource,
    store: &'a dyn ContentStore,
    run_id: &'a str,
    /// Catalog snapshot taken when the run starts.
    tags: &'a [Tag],
    opts: &'a SyncOptions,
    cancel: &'a CancellationToken,
}

impl RunContext<'_> {
    /// Await `fut` unless the run is cancelled first. A source or store
    /// call that never resolves cannot hold the run past cancellation.
    async fn guarded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            res = fut => res,
        }
    }

    async fn run_units(&self) -> Result<Vec<UnitReport>> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let themes = self
            .guarded(async {
                self.source
                    .list_themes(self.opts.limit)
                    .await
                    .map_err(|e| SyncError::ThemeListing(Box::new(e)))
            })
            .await?;
        info!(themes = themes.len(), "themes listed");

        let mut reports = Vec::new();
        for theme in &themes {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let detail = match self.guarded(self.source.theme_detail(&theme.theme_id)).await {
                Ok(detail) => detail,
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    warn!(theme = %theme.theme_id, error = %e, "theme detail failed");
                    reports.push(UnitReport::new(
                        theme.theme_id.clone(),
                        UnitOutcome::Failed(e.to_string()),
                    ));
                    continue;
                }
            };

            let formats = selected_formats(&detail, self.opts);
            info!(theme = %theme.theme_id, formats = formats.len(), "processing theme");

            for format in formats {
                if self.cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                let key = unit_key(&detail.theme.theme_id, format);
                let outcome = self.sync_unit(&detail, format).await?;
                match &outcome {
                    UnitOutcome::Failed(message) => {
                        warn!(unit = %key, error = %message, "unit failed")
                    }
                    other => debug!(unit = %key, outcome = ?other, "unit done"),
                }
                reports.push(UnitReport::new(key, outcome));
            }
        }

        Ok(reports)
    }

    /// Run one unit. Errors become [`UnitOutcome::Failed`] except
    /// cancellation, which ends the run.
    async fn sync_unit(&self, theme: &ThemeDetail, format: &Format) -> Result<UnitOutcome> {
        if !format.is_ready() {
            return Ok(UnitOutcome::Skipped(SkipReason::Status(
                format.status.clone(),
            )));
        }

        let mut item_id = None;
        match self.import_unit(theme, format, &mut item_id).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let message = e.to_string();
                if let Some(id) = item_id {
                    if let Err(mark_err) = self.store.fail_item(&id, &message).await {
                        warn!(item = %id, error = %mark_err, "could not mark item as failed");
                    }
                }
                match e {
                    SyncError::Cancelled => Err(e),
                    _ => Ok(UnitOutcome::Failed(message)),
                }
            }
        }
    }

    /// Fetch, convert, and persist one unit. Sets `item_id` as soon as the
    /// ledger item exists so the caller can mark it failed.
    async fn import_unit(
        &self,
        theme: &ThemeDetail,
        format: &Format,
        item_id: &mut Option<String>,
    ) -> Result<UnitOutcome> {
        let theme_id = theme.theme.theme_id.as_str();
        let content = self
            .guarded(
                self.source
                    .content(theme_id, &format.format_code, &format.lang),
            )
            .await?;
        let ext_id = external_id(theme_id, &format.format_code, &format.lang);

        let existing = self.guarded(self.store.find_content(&ext_id)).await?;
        if existing.is_some() && !self.opts.force_update {
            return Ok(UnitOutcome::Skipped(SkipReason::Existing));
        }

        let converted = convert_content(&content, theme, self.tags, Utc::now())?;

        if self.opts.dry_run {
            info!(
                external_id = %ext_id,
                action = if existing.is_some() { "update" } else { "import" },
                "dry run"
            );
            return Ok(UnitOutcome::DryRun {
                would_update: existing.is_some(),
            });
        }

        let id = self
            .guarded(
                self.store
                    .create_item(self.run_id, &unit_key(theme_id, format)),
            )
            .await?;
        *item_id = Some(id.clone());

        // Dropping the upsert on cancellation rolls its transaction back.
        let upserted = self.guarded(self.store.upsert_content(&converted)).await?;
        let (status, outcome) = if upserted.created {
            (ItemStatus::Imported, UnitOutcome::Imported)
        } else {
            (ItemStatus::Updated, UnitOutcome::Updated)
        };
        self.guarded(
            self.store
                .finish_item(&id, status, &upserted.content_id),
        )
        .await?;
        Ok(outcome)
    }
}
