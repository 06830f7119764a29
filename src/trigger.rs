//! Externally triggered sync and status reports.
//!
//! These are the JSON-shaped entry points an admin surface calls: a
//! validated sync trigger, the source configuration status, and the ledger
//! status. The CLI prints the same shapes with `--json`.

use chrono::{TimeZone, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::source::ThemeSource;
use crate::store::{ContentStore, SqliteStore};
use crate::sync::{run_sync, FileError, SyncOptions, SyncResult};

/// Sentinel for "no filter" in `format` and `language`.
pub const ALL: &str = "ALL";

pub const VALID_FORMATS: &[&str] = &["M", "T", "IG", "TW", "FB", "LI", "W_ART", "V_LONG"];
pub const VALID_LANGUAGES: &[&str] = &["UA", "EN", "RU"];

/// Theme limit for triggered runs.
pub const DEFAULT_TRIGGER_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub force_update: Option<bool>,
    #[serde(default)]
    pub dry_run: Option<bool>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl TriggerRequest {
    /// Validate and turn the request into run options.
    pub fn into_options(self) -> Result<SyncOptions> {
        let format = filter_value(self.format, VALID_FORMATS, "format")?;
        let language = filter_value(self.language, VALID_LANGUAGES, "language")?;
        let limit = self.limit.unwrap_or(DEFAULT_TRIGGER_LIMIT);
        if limit == 0 {
            return Err(SyncError::InvalidRequest("limit must be >= 1".to_string()));
        }

        Ok(SyncOptions {
            format,
            language,
            force_update: self.force_update.unwrap_or(false),
            dry_run: self.dry_run.unwrap_or(false),
            limit,
        })
    }
}

fn filter_value(value: Option<String>, valid: &[&str], what: &str) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(v) if v.is_empty() || v == ALL => Ok(None),
        Some(v) if valid.contains(&v.as_str()) => Ok(Some(v)),
        Some(v) => Err(SyncError::InvalidRequest(format!("Invalid {}: {}", what, v))),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub success: bool,
    pub dry_run: bool,
    pub result: TriggerSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSummary {
    pub processed_files: u64,
    pub imported_files: u64,
    pub updated_files: u64,
    pub skipped_files: u64,
    pub errors: u64,
    pub error_details: Vec<FileError>,
}

impl From<SyncResult> for TriggerSummary {
    fn from(r: SyncResult) -> Self {
        Self {
            processed_files: r.processed_files,
            imported_files: r.imported_files,
            updated_files: r.updated_files,
            skipped_files: r.skipped_files,
            errors: r.error_files,
            error_details: r.errors,
        }
    }
}

/// Validate `request` and run a sync.
///
/// # Errors
///
/// [`SyncError::InvalidRequest`] for an unknown format or language, before
/// anything is fetched or written; otherwise whatever [`run_sync`] returns.
pub async fn run_trigger(
    source: &dyn ThemeSource,
    store: &dyn ContentStore,
    request: TriggerRequest,
    cancel: &CancellationToken,
) -> Result<TriggerResponse> {
    let opts = request.into_options()?;
    let result = run_sync(source, store, &opts, cancel).await?;
    Ok(TriggerResponse {
        success: true,
        dry_run: opts.dry_run,
        result: result.into(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub configured: bool,
    /// Origin of the endpoint only; never the path or the key.
    pub api_url: Option<String>,
    pub has_api_key: bool,
}

pub fn source_status(config: &Config) -> SourceStatus {
    let Some(api) = &config.api else {
        return SourceStatus {
            configured: false,
            api_url: None,
            has_api_key: false,
        };
    };

    SourceStatus {
        configured: api.is_configured(),
        api_url: Url::parse(api.endpoint.trim())
            .ok()
            .map(|u| u.origin().ascii_serialization()),
        has_api_key: api.resolved_key().is_some(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStatus {
    /// Completion time of the latest run, RFC 3339.
    pub last_sync: Option<String>,
    pub total_items: i64,
    pub synced_items: i64,
    pub failed_items: i64,
    pub is_running: bool,
}

pub async fn ledger_status(store: &SqliteStore) -> Result<LedgerStatus> {
    let latest = store.latest_run(None).await?;
    let counts = store.item_counts().await?;

    Ok(LedgerStatus {
        last_sync: latest
            .as_ref()
            .and_then(|r| r.completed_at)
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .map(|t| t.to_rfc3339()),
        total_items: counts.total,
        synced_items: counts.synced,
        failed_items: counts.failed,
        is_running: latest.is_some_and(|r| r.completed_at.is_none()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;

    fn request(json: &str) -> TriggerRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn all_means_no_filter_and_limit_defaults() {
        let opts = request(r#"{"format":"ALL","language":"ALL"}"#)
            .into_options()
            .unwrap();
        assert_eq!(opts.format, None);
        assert_eq!(opts.language, None);
        assert_eq!(opts.limit, DEFAULT_TRIGGER_LIMIT);
        assert!(!opts.force_update);
        assert!(!opts.dry_run);
    }

    #[test]
    fn camel_case_flags_are_read() {
        let opts = request(r#"{"format":"W_ART","language":"EN","forceUpdate":true,"dryRun":true,"limit":5}"#)
            .into_options()
            .unwrap();
        assert_eq!(opts.format.as_deref(), Some("W_ART"));
        assert_eq!(opts.language.as_deref(), Some("EN"));
        assert!(opts.force_update);
        assert!(opts.dry_run);
        assert_eq!(opts.limit, 5);
    }

    #[test]
    fn unknown_format_or_language_is_rejected() {
        let err = request(r#"{"format":"PODCAST"}"#).into_options().unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(ref m) if m == "Invalid format: PODCAST"));

        let err = request(r#"{"language":"DE"}"#).into_options().unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(ref m) if m == "Invalid language: DE"));

        assert!(request(r#"{"limit":0}"#).into_options().is_err());
    }

    #[test]
    fn source_status_reports_origin_without_key() {
        let mut config = Config::with_db("/tmp/unused.sqlite");
        assert_eq!(
            source_status(&config),
            SourceStatus {
                configured: false,
                api_url: None,
                has_api_key: false
            }
        );

        config.api = Some(ApiConfig::new("https://kb.example.com:8443/api/v1", "secret"));
        let status = source_status(&config);
        assert!(status.configured);
        assert!(status.has_api_key);
        assert_eq!(status.api_url.as_deref(), Some("https://kb.example.com:8443"));
        assert!(!serde_json::to_string(&status).unwrap().contains("secret"));

        config.api = Some(ApiConfig::new("https://kb.example.com/api/v1", ""));
        let status = source_status(&config);
        assert!(!status.configured);
        assert!(!status.has_api_key);
    }
}
