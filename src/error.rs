//! Error types for Trestle
//!
//! All modules use `TrestleResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Trestle operations
pub type TrestleResult<T> = Result<T, TrestleError>;

/// All errors that can occur in Trestle
#[derive(Error, Debug)]
pub enum TrestleError {
    // Strategy configuration errors
    #[error("resolution strategy cannot be changed after resolution has started")]
    StrategyFrozen,

    #[error("invalid module selector notation '{notation}': {reason}")]
    InvalidSelectorNotation { notation: String, reason: String },

    #[error("unrecognized time unit '{unit}'. Supported units: seconds, minutes, hours, days")]
    InvalidTimeUnit { unit: String },

    // Workspace cache errors
    #[error("workspace cache is closed")]
    StoreClosed,

    #[error("failed to lock cache store at {path}: {reason}")]
    StoreLock { path: PathBuf, reason: String },

    #[error("access journal at {path} is corrupt: {reason}")]
    JournalCorrupt { path: PathBuf, reason: String },

    #[error("invalid workspace subject '{subject}': {reason}")]
    SubjectInvalid { subject: String, reason: String },

    // Configuration errors
    #[error("invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl TrestleError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a selector notation error
    pub fn notation(notation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSelectorNotation {
            notation: notation.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error signals a configuration mistake the user can fix
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSelectorNotation { .. }
                | Self::InvalidTimeUnit { .. }
                | Self::SubjectInvalid { .. }
                | Self::ConfigInvalid { .. }
        )
    }
}
