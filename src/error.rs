use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LogQueryError>;

#[derive(Debug, Error)]
pub enum LogQueryError {
    #[error("log directory not found: {}", path.display())]
    DirectoryNotFound { path: PathBuf },

    #[error("cannot read log directory: {} - {reason}", path.display())]
    DirectoryUnreadable { path: PathBuf, reason: String },

    #[error("cannot read log file: {} - {reason}", path.display())]
    FileUnreadable { path: PathBuf, reason: String },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid group key: {0}")]
    InvalidGroupKey(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LogQueryError {
    /// Stable machine-readable name, used in structured error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            LogQueryError::DirectoryNotFound { .. } => "directory_not_found",
            LogQueryError::DirectoryUnreadable { .. } => "directory_unreadable",
            LogQueryError::FileUnreadable { .. } => "file_unreadable",
            LogQueryError::InvalidFilter(_) => "invalid_filter",
            LogQueryError::InvalidGroupKey(_) => "invalid_group_key",
            LogQueryError::NotFound(_) => "not_found",
            LogQueryError::InvalidRequest(_) => "invalid_request",
            LogQueryError::ConfigError(_) => "config_error",
            LogQueryError::Io(_) => "io_error",
        }
    }

    /// True for errors caused by caller input rather than the file system.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LogQueryError::InvalidFilter(_)
                | LogQueryError::InvalidGroupKey(_)
                | LogQueryError::InvalidRequest(_)
        )
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        match self {
            LogQueryError::DirectoryNotFound { path }
            | LogQueryError::DirectoryUnreadable { path, .. }
            | LogQueryError::FileUnreadable { path, .. } => {
                body["path"] = serde_json::Value::String(path.to_string_lossy().into_owned());
            }
            _ => {}
        }
        serde_json::json!({ "error": body })
    }
}
