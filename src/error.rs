//! Error taxonomy for the sync engine.
//!
//! Library operations return [`SyncError`]. The orchestrator catches
//! transport, remote, conversion, and persistence errors at the boundary of a
//! single (theme, format, language) unit and records them; only
//! configuration errors, a failure to list themes, a held run lock, and
//! cancellation end a run early.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid endpoint/credential. Raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The external source could not be reached.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The external source answered with a non-success response.
    #[error("remote error{}: {message}", status_suffix(.status))]
    Remote {
        status: Option<u16>,
        message: String,
    },

    /// Content or theme metadata is insufficient for conversion.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// The local store rejected a read or write.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// The theme list itself could not be fetched; fatal to the run.
    #[error("failed to list themes: {0}")]
    ThemeListing(#[source] Box<SyncError>),

    /// Another run against the same source has not finished.
    #[error("a sync run for source '{source_label}' is already in progress")]
    RunInProgress { source_label: String },

    #[error("sync run cancelled")]
    Cancelled,

    /// A trigger request carried an unsupported filter value.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Remote {
                status: err.status().map(|s| s.as_u16()),
                message: format!("undecodable response body: {}", err),
            }
        } else {
            SyncError::Transport(err)
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_includes_status_and_message() {
        let err = SyncError::Remote {
            status: Some(404),
            message: "Theme not found".to_string(),
        };
        assert_eq!(err.to_string(), "remote error (404): Theme not found");

        let err = SyncError::Remote {
            status: None,
            message: "bad payload".to_string(),
        };
        assert_eq!(err.to_string(), "remote error: bad payload");
    }

    #[test]
    fn theme_listing_wraps_cause() {
        let err = SyncError::ThemeListing(Box::new(SyncError::Remote {
            status: Some(500),
            message: "boom".to_string(),
        }));
        assert_eq!(
            err.to_string(),
            "failed to list themes: remote error (500): boom"
        );
    }
}
