//! External knowledge-base client.
//!
//! Typed async wrapper around the remote content API. Every request carries
//! the `X-API-Key` credential and goes through one decode path: non-success
//! responses become [`SyncError::Remote`] with the server's message,
//! connection failures become [`SyncError::Transport`]. There are no
//! implicit retries.
//!
//! # Configuration
//!
//! ```toml
//! [api]
//! endpoint = "http://localhost:8000/api/v1"
//! api_key_env = "KB_API_KEY"
//! timeout_secs = 30
//! ```
//!
//! # Endpoints
//!
//! | Method | Path |
//! |--------|------|
//! | [`list_themes`](KnowledgeClient::list_themes) | `GET /themes` |
//! | [`get_theme`](KnowledgeClient::get_theme) | `GET /themes/{id}` |
//! | [`get_content`](KnowledgeClient::get_content) | `GET /content/{id}/{format}?lang=` |
//! | [`batch_content`](KnowledgeClient::batch_content) | `POST /content/batch` |
//! | [`search`](KnowledgeClient::search) | `GET /search` |
//! | [`sync_changes`](KnowledgeClient::sync_changes) | `GET /sync/changes` |
//! | [`sync_status`](KnowledgeClient::sync_status) | `GET /sync/status` |
//! | [`stats`](KnowledgeClient::stats) | `GET /stats` |
//! | [`formats`](KnowledgeClient::formats) | `GET /formats` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{Result, SyncError};
use crate::models::{
    BatchContent, BatchContentPage, BatchContentRequest, ChangesPage, Envelope, FormatsPage,
    RemoteContent, SearchPage, SyncChange, Theme, ThemeDetail, ThemesPage,
};
use crate::source::ThemeSource;

const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Filters for [`KnowledgeClient::list_themes`].
#[derive(Debug, Clone, Default)]
pub struct ThemeFilter {
    pub priority: Option<String>,
    pub is_cornerstone: Option<bool>,
    pub has_mastertext: Option<bool>,
    /// Comma-separated language codes.
    pub languages: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ThemeQuery {
    pub page: Option<u32>,
    pub limit: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub filter: ThemeFilter,
    pub search: Option<String>,
}

impl ThemeQuery {
    fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(sort_by) = &self.sort_by {
            pairs.push(("sort_by".to_string(), sort_by.clone()));
        }
        if let Some(order) = self.sort_order {
            pairs.push(("sort_order".to_string(), order.as_str().to_string()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }

        let f = &self.filter;
        let filters = [
            ("priority", f.priority.clone()),
            ("is_cornerstone", f.is_cornerstone.map(|b| b.to_string())),
            ("has_mastertext", f.has_mastertext.map(|b| b.to_string())),
            ("languages", f.languages.clone()),
            ("status", f.status.clone()),
        ];
        for (key, value) in filters {
            if let Some(value) = value {
                pairs.push((format!("filter[{}]", key), value));
            }
        }
        pairs
    }
}

/// Full-text search across content.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub q: String,
    pub lang: Option<String>,
    pub formats: Option<String>,
    pub themes: Option<String>,
    pub limit: Option<usize>,
}

/// Change feed query; `since` is an ISO-8601 timestamp.
#[derive(Debug, Clone, Default)]
pub struct ChangesQuery {
    pub since: String,
    /// Comma-separated subset of `created,updated,deleted`.
    pub types: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct BatchBody<'a> {
    requests: &'a [BatchContentRequest],
    include_metadata: bool,
}

/// Client for the external knowledge-base API.
#[derive(Debug, Clone)]
pub struct KnowledgeClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl KnowledgeClient {
    /// Validate the configuration and build the client.
    ///
    /// # Errors
    ///
    /// [`SyncError::Configuration`] if the endpoint or credential is missing,
    /// or the endpoint is not a valid URL. No request is made.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(SyncError::Configuration(
                "knowledge-base API endpoint is required".to_string(),
            ));
        }
        let api_key = config.resolved_key().ok_or_else(|| {
            SyncError::Configuration("knowledge-base API key is required".to_string())
        })?;
        let endpoint = Url::parse(config.endpoint.trim()).map_err(|e| {
            SyncError::Configuration(format!("invalid endpoint '{}': {}", config.endpoint, e))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(SyncError::Configuration(format!(
                "invalid endpoint '{}': not a base URL",
                config.endpoint
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }

    /// Origin of the configured endpoint (scheme, host, port).
    pub fn origin(&self) -> String {
        self.endpoint.origin().ascii_serialization()
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn request<T, B>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(String, String)],
        body: Option<&B>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(segments);
        debug!(%method, %url, "knowledge-base request");

        let mut req = self
            .http
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(query);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(SyncError::Transport)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SyncError::Remote {
                status: Some(status.as_u16()),
                message: decode_error_message(&text)
                    .or_else(|| status.canonical_reason().map(str::to_string))
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }

        let text = resp.text().await.map_err(SyncError::Transport)?;
        serde_json::from_str(&text).map_err(|e| SyncError::Remote {
            status: Some(status.as_u16()),
            message: format!("undecodable response body: {}", e),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(String, String)],
    ) -> Result<T> {
        self.request::<T, ()>(Method::GET, segments, query, None)
            .await
    }

    pub async fn list_themes(&self, query: &ThemeQuery) -> Result<Vec<Theme>> {
        let page: Envelope<ThemesPage> = self.get(&["themes"], &query.to_pairs()).await?;
        Ok(page.data.themes)
    }

    pub async fn get_theme(&self, theme_id: &str) -> Result<ThemeDetail> {
        let detail: Envelope<ThemeDetail> = self.get(&["themes", theme_id], &[]).await?;
        Ok(detail.data)
    }

    pub async fn get_content(
        &self,
        theme_id: &str,
        format: &str,
        lang: &str,
    ) -> Result<RemoteContent> {
        let query = [("lang".to_string(), lang.to_string())];
        let content: Envelope<RemoteContent> =
            self.get(&["content", theme_id, format], &query).await?;
        Ok(content.data)
    }

    pub async fn batch_content(
        &self,
        requests: &[BatchContentRequest],
        include_metadata: bool,
    ) -> Result<BatchContent> {
        let body = BatchBody {
            requests,
            include_metadata,
        };
        let page: Envelope<BatchContentPage> = self
            .request(Method::POST, &["content", "batch"], &[], Some(&body))
            .await?;
        Ok(page.data.content)
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<serde_json::Value>> {
        let mut pairs = vec![("q".to_string(), query.q.clone())];
        if let Some(lang) = &query.lang {
            pairs.push(("lang".to_string(), lang.clone()));
        }
        if let Some(formats) = &query.formats {
            pairs.push(("formats".to_string(), formats.clone()));
        }
        if let Some(themes) = &query.themes {
            pairs.push(("themes".to_string(), themes.clone()));
        }
        if let Some(limit) = query.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        let page: Envelope<SearchPage> = self.get(&["search"], &pairs).await?;
        Ok(page.data.results)
    }

    pub async fn sync_changes(&self, query: &ChangesQuery) -> Result<Vec<SyncChange>> {
        let mut pairs = vec![("since".to_string(), query.since.clone())];
        if let Some(types) = &query.types {
            pairs.push(("types".to_string(), types.clone()));
        }
        if let Some(limit) = query.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        let page: Envelope<ChangesPage> = self.get(&["sync", "changes"], &pairs).await?;
        Ok(page.data.changes)
    }

    pub async fn sync_status(&self) -> Result<serde_json::Value> {
        let status: Envelope<serde_json::Value> = self.get(&["sync", "status"], &[]).await?;
        Ok(status.data)
    }

    pub async fn stats(&self) -> Result<serde_json::Value> {
        let stats: Envelope<serde_json::Value> = self.get(&["stats"], &[]).await?;
        Ok(stats.data)
    }

    pub async fn formats(&self) -> Result<Vec<serde_json::Value>> {
        let page: Envelope<FormatsPage> = self.get(&["formats"], &[]).await?;
        Ok(page.data.formats)
    }
}

/// Pull `error.message` (or a bare `error` string) out of an error body.
fn decode_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(str::to_string)
}

#[async_trait]
impl ThemeSource for KnowledgeClient {
    fn label(&self) -> String {
        format!("api:{}", self.origin())
    }

    async fn list_themes(&self, limit: usize) -> Result<Vec<Theme>> {
        let query = ThemeQuery {
            limit: Some(limit),
            filter: ThemeFilter {
                has_mastertext: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        KnowledgeClient::list_themes(self, &query).await
    }

    async fn theme_detail(&self, theme_id: &str) -> Result<ThemeDetail> {
        self.get_theme(theme_id).await
    }

    async fn content(&self, theme_id: &str, format_code: &str, lang: &str) -> Result<RemoteContent> {
        self.get_content(theme_id, format_code, lang).await
    }
}
