//! Core data models used throughout kbsync.
//!
//! The first half mirrors the external knowledge-base API (themes, formats,
//! content bodies, change feed). The second half is the local shape the
//! converter produces and the store persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
// External shapes
// ═══════════════════════════════════════════════════════════════════════

/// Every API response is wrapped in `{ "data": ..., "meta": ... }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

/// Theme priority. Unknown labels are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
    Other(String),
}

impl From<String> for Priority {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "high" => Priority::High,
            "medium" => Priority::Medium,
            "low" => Priority::Low,
            _ => Priority::Other(s),
        }
    }
}

impl From<Priority> for String {
    fn from(p: Priority) -> Self {
        p.to_string()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => f.write_str("High"),
            Priority::Medium => f.write_str("Medium"),
            Priority::Low => f.write_str("Low"),
            Priority::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalizedTitle {
    #[serde(default)]
    pub ua: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ru: Option<String>,
}

/// External taxonomy unit. Read-only to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Theme {
    pub theme_id: String,
    #[serde(default)]
    pub title: LocalizedTitle,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub is_cornerstone: bool,
    #[serde(default)]
    pub knowledge_type: String,
    #[serde(default)]
    pub has_mastertext: bool,
    #[serde(default)]
    pub has_thesises: bool,
    #[serde(default)]
    pub formats_count: u32,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub related_themes: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A theme's representation in one (format_code, language) pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Format {
    pub format_code: String,
    #[serde(default)]
    pub format_name: String,
    pub lang: String,
    pub status: String,
    #[serde(default)]
    pub word_count: u64,
    #[serde(default)]
    pub readiness: f64,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Format {
    /// Formats in these lifecycle states are ready to be synced.
    pub fn is_ready(&self) -> bool {
        matches!(self.status.as_str(), "done" | "published")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeMetadata {
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub is_cornerstone: Option<bool>,
    #[serde(default)]
    pub knowledge_type: Option<String>,
    #[serde(default)]
    pub theme_status: Option<String>,
    #[serde(default)]
    pub related_themes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeStats {
    #[serde(default)]
    pub total_formats: u32,
    #[serde(default)]
    pub completed_formats: u32,
    #[serde(default)]
    pub total_words: u64,
    #[serde(default)]
    pub languages: Vec<String>,
}

/// Theme plus its formats, metadata, and aggregate stats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeDetail {
    #[serde(flatten)]
    pub theme: Theme,
    #[serde(default)]
    pub formats: Vec<Format>,
    #[serde(default)]
    pub metadata: ThemeMetadata,
    #[serde(default)]
    pub stats: ThemeStats,
}

/// Editorial quality sub-scores, each on a 0–10 scale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practical_utility: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_of_insight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_clarity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytical_rigor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_density: Option<f64>,
}

impl QualityScores {
    /// Mean of the sub-scores that are present; 0 when none are.
    pub fn average(&self) -> f64 {
        let values: Vec<f64> = [
            self.practical_utility,
            self.depth_of_insight,
            self.structured_clarity,
            self.analytical_rigor,
            self.knowledge_density,
        ]
        .into_iter()
        .flatten()
        .collect();

        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentMetadata {
    #[serde(default)]
    pub status: String,
    /// Optional on the wire; the converter refuses content without it.
    #[serde(default)]
    pub word_count: Option<u64>,
    #[serde(default)]
    pub readiness: f64,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub requires_update: Option<bool>,
    #[serde(default)]
    pub last_review: Option<String>,
    #[serde(default)]
    pub submitter: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub quality_scores: Option<QualityScores>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A content body for one (theme, format, language).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteContent {
    pub theme_id: String,
    #[serde(default)]
    pub format: String,
    pub format_code: String,
    pub lang: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: ContentMetadata,
    #[serde(default)]
    pub file_info: Option<FileInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemesPage {
    pub themes: Vec<Theme>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchContentRequest {
    pub theme_id: String,
    pub formats: Vec<String>,
    pub languages: Vec<String>,
}

/// theme_id → format → lang → content payload.
pub type BatchContent = BTreeMap<String, BTreeMap<String, BTreeMap<String, serde_json::Value>>>;

#[derive(Debug, Clone, Deserialize)]
pub struct BatchContentPage {
    pub content: BatchContent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    pub results: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeDetails {
    #[serde(default)]
    pub fields_changed: Vec<String>,
    #[serde(default)]
    pub old_status: Option<String>,
    #[serde(default)]
    pub new_status: Option<String>,
}

/// One entry of the remote change feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncChange {
    pub change_id: String,
    pub theme_id: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    pub change_type: ChangeType,
    pub timestamp: String,
    #[serde(default)]
    pub details: Option<ChangeDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangesPage {
    pub changes: Vec<SyncChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatsPage {
    pub formats: Vec<serde_json::Value>,
}

// ═══════════════════════════════════════════════════════════════════════
// Local shapes
// ═══════════════════════════════════════════════════════════════════════

/// Classification label from the local tag catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Article,
    Guide,
    Video,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Article => "ARTICLE",
            ContentType::Guide => "GUIDE",
            ContentType::Video => "VIDEO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "BEGINNER",
            Difficulty::Intermediate => "INTERMEDIATE",
            Difficulty::Advanced => "ADVANCED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    Published,
    Draft,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Published => "PUBLISHED",
            ContentStatus::Draft => "DRAFT",
        }
    }
}

/// The Content row the converter produces for one format.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub external_id: String,
    pub slug: String,
    pub content_type: ContentType,
    pub format: String,
    pub status: ContentStatus,
    pub is_published: bool,
    pub is_premium: bool,
    pub difficulty: Difficulty,
    pub estimated_time: u64,
    pub sort_order: i64,
    pub metadata_json: String,
    pub quality_scores_json: String,
    /// SHA-256 of the body, kept as provenance. Sync decisions never read it:
    /// existing content is skipped by external id unless forced.
    pub content_hash: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTranslation {
    pub language: String,
    pub title: String,
    pub description: String,
    pub body: String,
}

/// Output of the converter: one content row, its translations, and the
/// ids of catalog tags to associate.
#[derive(Debug, Clone)]
pub struct ConvertedContent {
    pub content: NewContent,
    pub translations: Vec<NewTranslation>,
    pub tag_ids: Vec<String>,
}

/// A Content row as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredContent {
    pub id: String,
    pub external_id: String,
    pub slug: String,
    pub content_type: String,
    pub is_premium: bool,
    pub difficulty: String,
    pub estimated_time: i64,
    /// Provenance only; see [`NewContent::content_hash`].
    pub content_hash: String,
    pub updated_at: i64,
}
