//! Content conversion.
//!
//! Turns one external content record plus its theme into the local content
//! shape: classification, identity, translation, and tag association. The
//! conversion is a pure function of its inputs; the caller supplies the
//! timestamp used for `published_at`.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::{Result, SyncError};
use crate::models::{
    ContentStatus, ContentType, ConvertedContent, Difficulty, NewContent, NewTranslation,
    Priority, RemoteContent, Tag, ThemeDetail,
};

/// Reading speed used for the consumption estimate.
const WORDS_PER_MINUTE: u64 = 200;

const DESCRIPTION_MAX_CHARS: usize = 200;

/// Format code → local content type. Also the whitelist of synced formats.
const FORMAT_CONTENT_TYPES: &[(&str, ContentType)] = &[
    ("M", ContentType::Article),
    ("T", ContentType::Guide),
    ("IG", ContentType::Article),
    ("TW", ContentType::Article),
    ("W_ART", ContentType::Article),
    ("V_LONG", ContentType::Video),
    ("FB", ContentType::Article),
    ("LI", ContentType::Article),
];

const MASTER_TEXT: &str = "M";

/// Deterministic identity of a local content row.
pub fn external_id(theme_id: &str, format_code: &str, lang: &str) -> String {
    format!("{}_{}_{}", theme_id, format_code, lang).to_lowercase()
}

pub fn content_type_for(format_code: &str) -> ContentType {
    FORMAT_CONTENT_TYPES
        .iter()
        .find(|(code, _)| *code == format_code)
        .map(|(_, ty)| *ty)
        .unwrap_or(ContentType::Article)
}

pub fn is_supported_format(format_code: &str) -> bool {
    FORMAT_CONTENT_TYPES
        .iter()
        .any(|(code, _)| *code == format_code)
}

/// Supported format codes, in table order.
pub fn supported_formats() -> impl Iterator<Item = &'static str> {
    FORMAT_CONTENT_TYPES.iter().map(|(code, _)| *code)
}

/// Map a long format name to its code; unknown names are uppercased.
pub fn normalize_format(format: &str) -> String {
    match format.to_lowercase().as_str() {
        "master" => "M".to_string(),
        "thesises" => "T".to_string(),
        "instagram" => "IG".to_string(),
        "twitter" => "TW".to_string(),
        "web_article" => "W_ART".to_string(),
        "video_long" => "V_LONG".to_string(),
        "facebook" => "FB".to_string(),
        "linkedin" => "LI".to_string(),
        _ => format.to_uppercase(),
    }
}

/// External language code → local language code (defaults to `UA`).
pub fn local_language(lang: &str) -> &'static str {
    match lang.to_lowercase().as_str() {
        "en" => "EN",
        "ru" => "RU",
        _ => "UA",
    }
}

pub fn difficulty(knowledge_type: &str, format_code: &str) -> Difficulty {
    if knowledge_type == "cornerstone" || format_code == MASTER_TEXT {
        Difficulty::Advanced
    } else if knowledge_type == "high_value" {
        Difficulty::Intermediate
    } else {
        Difficulty::Beginner
    }
}

pub fn is_premium(content: &RemoteContent, theme: &ThemeDetail) -> bool {
    if theme.theme.is_cornerstone || content.format_code == MASTER_TEXT {
        return true;
    }

    let average = content
        .metadata
        .quality_scores
        .as_ref()
        .map(|s| s.average())
        .unwrap_or(0.0);
    if average > 8.0 {
        return true;
    }

    theme.theme.priority == Priority::High
}

pub fn estimated_minutes(word_count: u64) -> u64 {
    word_count.div_ceil(WORDS_PER_MINUTE)
}

/// Lowercase and replace whitespace runs with `-`.
pub fn slugify_tag(tag: &str) -> String {
    tag.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// First paragraph of the body with a leading heading removed, truncated to
/// 200 characters.
pub fn description(body: &str) -> String {
    let paragraph = body.split("\n\n").next().unwrap_or("");

    let stripped = if paragraph.starts_with('#') {
        match paragraph.split_once('\n') {
            Some((_, rest)) => rest,
            None => paragraph.trim_start_matches('#'),
        }
    } else {
        paragraph
    };

    stripped
        .trim()
        .chars()
        .take(DESCRIPTION_MAX_CHARS)
        .collect()
}

fn sort_order(priority: &Priority) -> i64 {
    match priority {
        Priority::High => 1,
        Priority::Medium => 2,
        _ => 3,
    }
}

/// Hex SHA-256 of the body, recorded with each write.
fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Convert one external content record into the local content shape.
///
/// # Errors
///
/// Returns [`SyncError::Conversion`] when the theme id, format code, or
/// title is empty, or when `word_count` is absent.
pub fn convert_content(
    content: &RemoteContent,
    theme: &ThemeDetail,
    existing_tags: &[Tag],
    now: DateTime<Utc>,
) -> Result<ConvertedContent> {
    let theme_id = theme.theme.theme_id.as_str();
    if theme_id.trim().is_empty() {
        return Err(SyncError::Conversion("theme has no theme_id".to_string()));
    }
    if content.format_code.trim().is_empty() {
        return Err(SyncError::Conversion(format!(
            "content for theme '{}' has no format_code",
            theme_id
        )));
    }
    if content.title.trim().is_empty() {
        return Err(SyncError::Conversion(format!(
            "content {}/{}-{} has no title",
            theme_id, content.format_code, content.lang
        )));
    }
    let word_count = content.metadata.word_count.ok_or_else(|| {
        SyncError::Conversion(format!(
            "content {}/{}-{} is missing word_count",
            theme_id, content.format_code, content.lang
        ))
    })?;

    let format_code = content.format_code.as_str();
    let published = content.metadata.status == "done";

    let tag_slugs: Vec<String> = content
        .metadata
        .tags
        .iter()
        .chain(theme.metadata.tags.iter())
        .map(|t| slugify_tag(t))
        .collect();
    let tag_ids = existing_tags
        .iter()
        .filter(|tag| tag_slugs.contains(&tag.slug))
        .map(|tag| tag.id.clone())
        .collect();

    let metadata = serde_json::json!({
        "theme_id": theme_id,
        "format": content.format,
        "format_code": format_code,
        "language": content.lang,
        "quality_scores": content.metadata.quality_scores,
        "word_count": word_count,
        "readiness": content.metadata.readiness,
        "status": content.metadata.status,
        "priority": theme.theme.priority.to_string(),
        "is_cornerstone": theme.theme.is_cornerstone,
        "knowledge_type": theme.theme.knowledge_type,
        "related_themes": theme.theme.related_themes,
    });
    let quality_scores = serde_json::to_value(&content.metadata.quality_scores)
        .ok()
        .filter(|v| !v.is_null())
        .unwrap_or_else(|| serde_json::json!({}));

    Ok(ConvertedContent {
        content: NewContent {
            external_id: external_id(theme_id, format_code, &content.lang),
            slug: format!("{}-{}", theme_id, format_code).to_lowercase(),
            content_type: content_type_for(format_code),
            format: format_code.to_string(),
            status: if published {
                ContentStatus::Published
            } else {
                ContentStatus::Draft
            },
            is_published: published,
            is_premium: is_premium(content, theme),
            difficulty: difficulty(&theme.theme.knowledge_type, format_code),
            estimated_time: estimated_minutes(word_count),
            sort_order: sort_order(&theme.theme.priority),
            metadata_json: metadata.to_string(),
            quality_scores_json: quality_scores.to_string(),
            content_hash: content_hash(&content.content),
            published_at: published.then_some(now),
        },
        translations: vec![NewTranslation {
            language: local_language(&content.lang).to_string(),
            title: content.title.clone(),
            description: description(&content.content),
            body: content.content.clone(),
        }],
        tag_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentMetadata, QualityScores, Theme, ThemeMetadata};

    fn theme(cornerstone: bool, priority: Priority, knowledge_type: &str) -> ThemeDetail {
        ThemeDetail {
            theme: Theme {
                theme_id: "Brake_Control".to_string(),
                priority,
                is_cornerstone: cornerstone,
                knowledge_type: knowledge_type.to_string(),
                related_themes: vec!["cornering".to_string()],
                ..Default::default()
            },
            metadata: ThemeMetadata {
                tags: vec!["Road Safety".to_string()],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn content(format_code: &str, word_count: Option<u64>) -> RemoteContent {
        RemoteContent {
            theme_id: "Brake_Control".to_string(),
            format: "thesises".to_string(),
            format_code: format_code.to_string(),
            lang: "ua".to_string(),
            title: "Braking".to_string(),
            content: "# Braking\nUse both brakes.\n\nSecond paragraph.".to_string(),
            metadata: ContentMetadata {
                status: "done".to_string(),
                word_count,
                tags: vec!["Braking".to_string(), "unknown tag".to_string()],
                ..Default::default()
            },
            file_info: None,
        }
    }

    fn catalog() -> Vec<Tag> {
        vec![
            Tag {
                id: "t-safety".to_string(),
                slug: "road-safety".to_string(),
                name: "Road safety".to_string(),
            },
            Tag {
                id: "t-braking".to_string(),
                slug: "braking".to_string(),
                name: "Braking".to_string(),
            },
            Tag {
                id: "t-other".to_string(),
                slug: "other".to_string(),
                name: "Other".to_string(),
            },
        ]
    }

    #[test]
    fn external_id_is_lowercase_and_stable() {
        let a = external_id("Brake_Control", "W_ART", "UA");
        assert_eq!(a, "brake_control_w_art_ua");
        assert_eq!(a, external_id("Brake_Control", "W_ART", "UA"));
    }

    #[test]
    fn format_table_and_default() {
        assert_eq!(content_type_for("M"), ContentType::Article);
        assert_eq!(content_type_for("T"), ContentType::Guide);
        assert_eq!(content_type_for("V_LONG"), ContentType::Video);
        assert_eq!(content_type_for("PODCAST"), ContentType::Article);
        assert!(is_supported_format("LI"));
        assert!(!is_supported_format("PODCAST"));
        assert_eq!(supported_formats().count(), 8);
    }

    #[test]
    fn normalize_format_names() {
        assert_eq!(normalize_format("master"), "M");
        assert_eq!(normalize_format("Video_Long"), "V_LONG");
        assert_eq!(normalize_format("ig"), "IG");
    }

    #[test]
    fn cornerstone_is_always_premium() {
        let t = theme(true, Priority::Low, "general");
        let mut c = content("T", Some(100));
        c.metadata.quality_scores = Some(QualityScores {
            practical_utility: Some(1.0),
            ..Default::default()
        });
        assert!(is_premium(&c, &t));
    }

    #[test]
    fn premium_rules() {
        let plain = theme(false, Priority::Low, "general");
        assert!(!is_premium(&content("T", Some(1)), &plain));
        assert!(is_premium(&content("M", Some(1)), &plain));
        assert!(is_premium(
            &content("T", Some(1)),
            &theme(false, Priority::High, "general")
        ));

        let mut high_quality = content("T", Some(1));
        high_quality.metadata.quality_scores = Some(QualityScores {
            practical_utility: Some(9.0),
            depth_of_insight: Some(8.5),
            ..Default::default()
        });
        assert!(is_premium(&high_quality, &plain));

        let mut exactly_eight = content("T", Some(1));
        exactly_eight.metadata.quality_scores = Some(QualityScores {
            practical_utility: Some(8.0),
            ..Default::default()
        });
        assert!(!is_premium(&exactly_eight, &plain));
    }

    #[test]
    fn difficulty_rules() {
        assert_eq!(difficulty("cornerstone", "T"), Difficulty::Advanced);
        assert_eq!(difficulty("general", "M"), Difficulty::Advanced);
        assert_eq!(difficulty("high_value", "T"), Difficulty::Intermediate);
        assert_eq!(difficulty("general", "IG"), Difficulty::Beginner);
    }

    #[test]
    fn estimated_time_rounds_up() {
        assert_eq!(estimated_minutes(0), 0);
        assert_eq!(estimated_minutes(1), 1);
        assert_eq!(estimated_minutes(200), 1);
        assert_eq!(estimated_minutes(201), 2);
    }

    #[test]
    fn description_strips_heading_and_truncates() {
        assert_eq!(
            description("# Title\nFirst line.\n\nSecond."),
            "First line."
        );
        assert_eq!(description("Plain start.\n\nMore."), "Plain start.");
        assert_eq!(description("## Only heading\n\nBody"), "Only heading");

        let long = "я".repeat(300);
        assert_eq!(description(&long).chars().count(), 200);
    }

    #[test]
    fn converts_full_record() {
        let now = Utc::now();
        let converted = convert_content(
            &content("T", Some(450)),
            &theme(false, Priority::Medium, "high_value"),
            &catalog(),
            now,
        )
        .unwrap();

        let c = &converted.content;
        assert_eq!(c.external_id, "brake_control_t_ua");
        assert_eq!(c.slug, "brake_control-t");
        assert_eq!(c.content_type, ContentType::Guide);
        assert_eq!(c.status, ContentStatus::Published);
        assert!(c.is_published);
        assert!(!c.is_premium);
        assert_eq!(c.difficulty, Difficulty::Intermediate);
        assert_eq!(c.estimated_time, 3);
        assert_eq!(c.sort_order, 2);
        assert_eq!(c.published_at, Some(now));
        assert_eq!(c.quality_scores_json, "{}");

        let meta: serde_json::Value = serde_json::from_str(&c.metadata_json).unwrap();
        assert_eq!(meta["theme_id"], "Brake_Control");
        assert_eq!(meta["priority"], "Medium");

        assert_eq!(converted.translations.len(), 1);
        assert_eq!(converted.translations[0].language, "UA");
        assert_eq!(converted.translations[0].description, "Use both brakes.");

        // catalog order, unknown tags dropped
        assert_eq!(converted.tag_ids, vec!["t-safety", "t-braking"]);
    }

    #[test]
    fn draft_status_is_not_published() {
        let mut c = content("T", Some(10));
        c.metadata.status = "published".to_string();
        let converted =
            convert_content(&c, &theme(false, Priority::Low, ""), &[], Utc::now()).unwrap();
        assert_eq!(converted.content.status, ContentStatus::Draft);
        assert!(converted.content.published_at.is_none());
    }

    #[test]
    fn missing_word_count_is_a_conversion_error() {
        let err = convert_content(
            &content("T", None),
            &theme(false, Priority::Low, ""),
            &[],
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::Conversion(_)));
        assert!(err.to_string().contains("word_count"));
    }

    #[test]
    fn conversion_is_deterministic() {
        let now = Utc::now();
        let t = theme(true, Priority::High, "cornerstone");
        let a = convert_content(&content("M", Some(999)), &t, &catalog(), now).unwrap();
        let b = convert_content(&content("M", Some(999)), &t, &catalog(), now).unwrap();
        assert_eq!(a.content.external_id, b.content.external_id);
        assert_eq!(a.content.metadata_json, b.content.metadata_json);
        assert_eq!(a.content.content_hash, b.content.content_hash);
        assert_eq!(a.translations, b.translations);
        assert_eq!(a.tag_ids, b.tag_ids);
    }
}
