//! Local vault source.
//!
//! Scans a directory tree of Markdown/text files named
//! `"<Title> ( <FORMAT>-<LANG> ) [ <status> ].md"`, reads their YAML front
//! matter, and groups them into themes. The vault is an alternative to the
//! remote API: it implements [`ThemeSource`] so a sync can run against it
//! unchanged.
//!
//! Files whose names do not follow the pattern are skipped with a warning.
//!
//! # Configuration
//!
//! ```toml
//! [vault]
//! root = "./vault"
//! include_globs = ["**/*.md", "**/*.txt"]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::VaultConfig;
use crate::error::{Result, SyncError};
use crate::models::{
    ContentMetadata, Format, LocalizedTitle, Priority, RemoteContent, Theme, ThemeDetail,
    ThemeStats,
};
use crate::source::ThemeSource;

const DEFAULT_STATUS: &str = "done";
const DEFAULT_MIN_SCORE: f64 = 7.0;

/// Title, format, language, and status taken from a vault file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileName {
    pub title: String,
    pub format: String,
    pub language: String,
    pub status: String,
}

fn file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^(.+?)\s*\(\s*([A-Z_]+)-([A-Z]+)\s*\)(?:\s*\[\s*([^\[\]]+?)\s*\])?\.(md|txt)$",
        )
        .expect("vault file name pattern is valid")
    })
}

/// Parse a vault file name. Returns `None` for names that do not match.
pub fn parse_file_name(file_name: &str) -> Option<ParsedFileName> {
    let caps = file_name_pattern().captures(file_name)?;
    let title = caps.get(1)?.as_str().trim();
    if title.is_empty() {
        return None;
    }
    Some(ParsedFileName {
        title: title.to_string(),
        format: caps.get(2)?.as_str().to_uppercase(),
        language: caps.get(3)?.as_str().to_uppercase(),
        status: caps
            .get(4)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
    })
}

/// Theme id for files without an explicit `theme_id` in front matter.
pub fn generate_theme_id(title: &str, language: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let collapsed = joined
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    format!("{}_{}", collapsed, language.to_lowercase())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeValue {
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub applicability_score: Option<f64>,
    #[serde(default)]
    pub uniqueness_score: Option<f64>,
    #[serde(default)]
    pub impact_score: Option<f64>,
    #[serde(default)]
    pub value_category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FrontMatter {
    #[serde(default)]
    theme_id: Option<String>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    modified: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    type_of_text: Option<String>,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    knowledge_type: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    is_cornerstone: Option<bool>,
    #[serde(default)]
    knowledge_value: Option<KnowledgeValue>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Split `---`-fenced front matter from the body. A leading byte order
/// mark is dropped.
fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, text)
}

#[derive(Debug, Clone, Serialize)]
pub struct VaultMetadata {
    pub created: Option<String>,
    pub modified: Option<String>,
    pub status: String,
    pub type_of_text: String,
    pub lang: String,
    pub knowledge_type: Option<String>,
    pub priority: Option<String>,
    pub is_cornerstone: bool,
    pub knowledge_value: Option<KnowledgeValue>,
    pub word_count: u64,
    pub tags: Vec<String>,
}

/// One parsed vault file.
#[derive(Debug, Clone, Serialize)]
pub struct VaultContent {
    pub title: String,
    pub theme_id: String,
    pub format: String,
    pub language: String,
    pub status: String,
    pub body: String,
    pub metadata: VaultMetadata,
    pub file_path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

impl VaultContent {
    pub fn overall_score(&self) -> f64 {
        self.metadata
            .knowledge_value
            .as_ref()
            .and_then(|kv| kv.overall_score)
            .unwrap_or(0.0)
    }
}

/// Vault files grouped by theme.
#[derive(Debug, Clone, Serialize)]
pub struct VaultTheme {
    pub theme_id: String,
    pub title: String,
    pub items: Vec<VaultContent>,
    pub is_cornerstone: bool,
    pub knowledge_type: String,
    pub formats: Vec<String>,
    pub languages: Vec<String>,
    pub total_word_count: u64,
    pub best_quality_score: f64,
    pub priority: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VaultStats {
    pub total_files: usize,
    pub total_themes: usize,
    pub total_words: u64,
    pub formats: BTreeMap<String, usize>,
    pub languages: BTreeMap<String, usize>,
    pub quality_distribution: BTreeMap<String, usize>,
    pub cornerstone_count: usize,
}

pub struct Vault {
    root: PathBuf,
    include: GlobSet,
    themes: RwLock<Option<Vec<VaultTheme>>>,
}

impl Vault {
    pub fn new(config: &VaultConfig) -> Result<Self> {
        Ok(Self {
            root: config.root.clone(),
            include: build_globset(&config.include_globs)?,
            themes: RwLock::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the vault and parse every matching file, in path order.
    pub fn scan(&self) -> Result<Vec<VaultContent>> {
        if !self.root.is_dir() {
            return Err(SyncError::Configuration(format!(
                "vault root does not exist: {}",
                self.root.display()
            )));
        }

        let mut items = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("vault: cannot read entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if !self.include.is_match(relative) {
                continue;
            }

            if let Some(item) = read_content_file(path) {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Themes sorted cornerstone-first, then by best quality score.
    pub fn themes(&self) -> Result<Vec<VaultTheme>> {
        Ok(group_themes(self.scan()?))
    }

    pub fn content_for_theme(
        &self,
        theme_id: &str,
        format: Option<&str>,
        language: Option<&str>,
    ) -> Result<Vec<VaultContent>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|item| item.theme_id == theme_id)
            .filter(|item| format.map_or(true, |f| item.format == f.to_uppercase()))
            .filter(|item| language.map_or(true, |l| item.language == l.to_uppercase()))
            .collect())
    }

    /// Items whose overall score is at least `min_score` (default 7.0).
    pub fn high_quality(&self, min_score: Option<f64>) -> Result<Vec<VaultContent>> {
        let min = min_score.unwrap_or(DEFAULT_MIN_SCORE);
        Ok(self
            .scan()?
            .into_iter()
            .filter(|item| item.overall_score() >= min)
            .collect())
    }

    pub fn cornerstone(&self) -> Result<Vec<VaultContent>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|item| item.metadata.is_cornerstone)
            .collect())
    }

    pub fn content_by_format(&self, format: &str, language: &str) -> Result<Vec<VaultContent>> {
        let format = format.to_uppercase();
        let language = language.to_uppercase();
        Ok(self
            .scan()?
            .into_iter()
            .filter(|item| item.format == format && item.language == language)
            .collect())
    }

    pub fn stats(&self) -> Result<VaultStats> {
        let items = self.scan()?;

        let mut formats = BTreeMap::new();
        let mut languages = BTreeMap::new();
        let mut quality_distribution: BTreeMap<String, usize> =
            ["excellent", "high", "medium", "low", "unknown"]
                .into_iter()
                .map(|k| (k.to_string(), 0))
                .collect();
        let mut total_words = 0;
        let mut cornerstone_count = 0;

        for item in &items {
            *formats.entry(item.format.clone()).or_insert(0) += 1;
            *languages.entry(item.language.clone()).or_insert(0) += 1;
            total_words += item.metadata.word_count;
            if item.metadata.is_cornerstone {
                cornerstone_count += 1;
            }
            let category = item
                .metadata
                .knowledge_value
                .as_ref()
                .and_then(|kv| kv.value_category.clone())
                .unwrap_or_else(|| "unknown".to_string());
            *quality_distribution.entry(category).or_insert(0) += 1;
        }

        let total_files = items.len();
        let total_themes = group_themes(items).len();

        Ok(VaultStats {
            total_files,
            total_themes,
            total_words,
            formats,
            languages,
            quality_distribution,
            cornerstone_count,
        })
    }

    fn cached_themes(&self) -> Result<Vec<VaultTheme>> {
        if let Some(themes) = self.themes.read().ok().and_then(|g| g.clone()) {
            return Ok(themes);
        }
        let themes = self.themes()?;
        if let Ok(mut guard) = self.themes.write() {
            *guard = Some(themes.clone());
        }
        Ok(themes)
    }

    fn find_theme(&self, theme_id: &str) -> Result<VaultTheme> {
        self.cached_themes()?
            .into_iter()
            .find(|t| t.theme_id == theme_id)
            .ok_or_else(|| SyncError::Remote {
                status: None,
                message: format!("theme not found in vault: {}", theme_id),
            })
    }
}

fn read_content_file(path: &Path) -> Option<VaultContent> {
    let file_name = path.file_name()?.to_string_lossy().to_string();
    let Some(parsed) = parse_file_name(&file_name) else {
        warn!("vault: skipping file with invalid name format: {}", file_name);
        return None;
    };

    let (text, metadata) = match std::fs::read_to_string(path)
        .and_then(|text| std::fs::metadata(path).map(|meta| (text, meta)))
    {
        Ok(pair) => pair,
        Err(e) => {
            warn!("vault: cannot read {}: {}", path.display(), e);
            return None;
        }
    };

    let (yaml, body) = split_front_matter(&text);
    let front: FrontMatter = match yaml {
        Some(yaml) if !yaml.trim().is_empty() => match serde_yaml::from_str(yaml) {
            Ok(fm) => fm,
            Err(e) => {
                warn!("vault: ignoring malformed front matter in {}: {}", file_name, e);
                FrontMatter::default()
            }
        },
        _ => FrontMatter::default(),
    };

    let body = body.trim().to_string();
    let word_count = body.split_whitespace().count() as u64;
    let status = front.status.clone().unwrap_or_else(|| parsed.status.clone());
    let theme_id = front
        .theme_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| generate_theme_id(&parsed.title, &parsed.language));
    let modified_at = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Some(VaultContent {
        title: parsed.title.clone(),
        theme_id,
        format: parsed.format.clone(),
        language: parsed.language.clone(),
        status: status.clone(),
        body,
        metadata: VaultMetadata {
            created: front.created,
            modified: front.modified,
            status,
            type_of_text: front
                .type_of_text
                .unwrap_or_else(|| parsed.format.to_lowercase()),
            lang: front
                .lang
                .unwrap_or_else(|| parsed.language.to_lowercase()),
            knowledge_type: front.knowledge_type,
            priority: front.priority,
            is_cornerstone: front.is_cornerstone.unwrap_or(false),
            knowledge_value: front.knowledge_value,
            word_count,
            tags: front.tags,
        },
        file_path: path.to_path_buf(),
        size_bytes: metadata.len(),
        modified_at,
    })
}

fn group_themes(items: Vec<VaultContent>) -> Vec<VaultTheme> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<VaultContent>> = HashMap::new();
    for item in items {
        if !groups.contains_key(&item.theme_id) {
            order.push(item.theme_id.clone());
        }
        groups.entry(item.theme_id.clone()).or_default().push(item);
    }

    let mut themes: Vec<VaultTheme> = order
        .into_iter()
        .filter_map(|id| groups.remove(&id).map(|items| (id, items)))
        .map(|(theme_id, items)| {
            let first = &items[0];
            let mut formats: Vec<String> = Vec::new();
            let mut languages: Vec<String> = Vec::new();
            for item in &items {
                if !formats.contains(&item.format) {
                    formats.push(item.format.clone());
                }
                if !languages.contains(&item.language) {
                    languages.push(item.language.clone());
                }
            }
            let best_quality_score = items
                .iter()
                .map(VaultContent::overall_score)
                .fold(0.0, f64::max);

            VaultTheme {
                theme_id,
                title: first.title.clone(),
                is_cornerstone: first.metadata.is_cornerstone,
                knowledge_type: first
                    .metadata
                    .knowledge_type
                    .clone()
                    .unwrap_or_else(|| "general".to_string()),
                priority: first
                    .metadata
                    .priority
                    .clone()
                    .unwrap_or_else(|| "medium".to_string()),
                formats,
                languages,
                total_word_count: items.iter().map(|i| i.metadata.word_count).sum(),
                best_quality_score,
                items,
            }
        })
        .collect();

    themes.sort_by(|a, b| {
        b.is_cornerstone.cmp(&a.is_cornerstone).then(
            b.best_quality_score
                .partial_cmp(&a.best_quality_score)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    themes
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            SyncError::Configuration(format!("invalid vault glob '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| SyncError::Configuration(format!("invalid vault globs: {}", e)))
}

impl VaultTheme {
    fn to_theme(&self) -> Theme {
        Theme {
            theme_id: self.theme_id.clone(),
            title: LocalizedTitle {
                ua: self.title.clone(),
                ..Default::default()
            },
            priority: Priority::from(self.priority.clone()),
            is_cornerstone: self.is_cornerstone,
            knowledge_type: self.knowledge_type.clone(),
            has_mastertext: self.formats.iter().any(|f| f == "M"),
            has_thesises: self.formats.iter().any(|f| f == "T"),
            formats_count: self.items.len() as u32,
            languages: self.languages.iter().map(|l| l.to_lowercase()).collect(),
            related_themes: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    fn to_detail(&self) -> ThemeDetail {
        let formats: Vec<Format> = self
            .items
            .iter()
            .map(|item| Format {
                format_code: item.format.clone(),
                format_name: item.metadata.type_of_text.clone(),
                lang: item.language.to_lowercase(),
                status: item.status.to_lowercase(),
                word_count: item.metadata.word_count,
                readiness: 100.0,
                file_path: Some(item.file_path.display().to_string()),
                updated_at: Some(item.modified_at.to_rfc3339()),
            })
            .collect();
        let completed = formats.iter().filter(|f| f.is_ready()).count() as u32;

        ThemeDetail {
            theme: self.to_theme(),
            stats: ThemeStats {
                total_formats: formats.len() as u32,
                completed_formats: completed,
                total_words: self.total_word_count,
                languages: self.languages.clone(),
            },
            formats,
            metadata: Default::default(),
        }
    }
}

impl From<&VaultContent> for RemoteContent {
    fn from(item: &VaultContent) -> Self {
        RemoteContent {
            theme_id: item.theme_id.clone(),
            format: item.metadata.type_of_text.clone(),
            format_code: item.format.clone(),
            lang: item.language.to_lowercase(),
            title: item.title.clone(),
            content: item.body.clone(),
            metadata: ContentMetadata {
                status: item.status.to_lowercase(),
                word_count: Some(item.metadata.word_count),
                readiness: 100.0,
                tags: item.metadata.tags.clone(),
                ..Default::default()
            },
            file_info: None,
        }
    }
}

#[async_trait]
impl ThemeSource for Vault {
    fn label(&self) -> String {
        format!("vault:{}", self.root.display())
    }

    /// Rescans the vault; later detail/content lookups use this snapshot.
    async fn list_themes(&self, limit: usize) -> Result<Vec<Theme>> {
        let themes = self.themes()?;
        if let Ok(mut guard) = self.themes.write() {
            *guard = Some(themes.clone());
        }
        Ok(themes
            .iter()
            .map(VaultTheme::to_theme)
            .filter(|t| t.has_mastertext)
            .take(limit)
            .collect())
    }

    async fn theme_detail(&self, theme_id: &str) -> Result<ThemeDetail> {
        Ok(self.find_theme(theme_id)?.to_detail())
    }

    async fn content(&self, theme_id: &str, format_code: &str, lang: &str) -> Result<RemoteContent> {
        let theme = self.find_theme(theme_id)?;
        theme
            .items
            .iter()
            .find(|item| {
                item.format.eq_ignore_ascii_case(format_code)
                    && item.language.eq_ignore_ascii_case(lang)
            })
            .map(RemoteContent::from)
            .ok_or_else(|| SyncError::Remote {
                status: None,
                message: format!(
                    "content not found in vault: {}/{}-{}",
                    theme_id, format_code, lang
                ),
            })
    }
}
