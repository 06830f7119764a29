//! Theme sources.
//!
//! The orchestrator pulls themes, formats, and content bodies through the
//! [`ThemeSource`] trait. Two sources are built in: the remote
//! [`KnowledgeClient`](crate::client::KnowledgeClient) and the local
//! [`Vault`](crate::vault::Vault). Tests and embedders can supply their own.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{RemoteContent, Theme, ThemeDetail};

/// A source of themed content for a sync run.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use kbsync::error::{Result, SyncError};
/// use kbsync::models::{RemoteContent, Theme, ThemeDetail};
/// use kbsync::source::ThemeSource;
///
/// struct Empty;
///
/// #[async_trait]
/// impl ThemeSource for Empty {
///     fn label(&self) -> String { "custom:empty".to_string() }
///
///     async fn list_themes(&self, _limit: usize) -> Result<Vec<Theme>> {
///         Ok(vec![])
///     }
///
///     async fn theme_detail(&self, id: &str) -> Result<ThemeDetail> {
///         Err(SyncError::Remote { status: Some(404), message: format!("no theme {}", id) })
///     }
///
///     async fn content(&self, id: &str, _f: &str, _l: &str) -> Result<RemoteContent> {
///         Err(SyncError::Remote { status: Some(404), message: format!("no theme {}", id) })
///     }
/// }
/// ```
#[async_trait]
pub trait ThemeSource: Send + Sync {
    /// Identifies the source in the run ledger; one run per label at a time.
    fn label(&self) -> String;

    /// Themes that have long-form text, in source order, at most `limit`.
    async fn list_themes(&self, limit: usize) -> Result<Vec<Theme>>;

    /// Theme metadata together with its formats.
    async fn theme_detail(&self, theme_id: &str) -> Result<ThemeDetail>;

    /// Content body for one (theme, format, language).
    async fn content(&self, theme_id: &str, format_code: &str, lang: &str)
        -> Result<RemoteContent>;
}
