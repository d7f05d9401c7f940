use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid date format: {0} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Slack auth error ({code}): {message}")]
    Auth { code: String, message: String },

    #[error("Slack not found error ({code}): {message}")]
    NotFound { code: String, message: String },

    #[error("Slack API error ({code}): {message}")]
    Transport { code: String, message: String },

    #[error("Slack rate limit error: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("failed to read file at {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file at {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("JSON serialization error: {0}")]
    JsonSerialize(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),
}

impl AppError {
    pub fn transport(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Transport {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Machine-readable error code reported by Slack, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            AppError::Auth { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Transport { code, .. } => Some(code.as_str()),
            AppError::RateLimited { .. } => Some("ratelimited"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure of a single file download. Never aborts a batch.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("no download URL found for file")]
    MissingUrl,

    #[error("no filename found for file")]
    MissingName,

    #[error("failed to download {name} - status code: {status}")]
    Status { name: String, status: u16 },

    #[error("failed to download {name} - got HTML login page instead of file ({content_type})")]
    LoginPage { name: String, content_type: String },

    #[error("failed to download {name}: {message}")]
    Request { name: String, message: String },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
