//! Error types for spritevault.
//!
//! Library crates use [`SpriteVaultError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! "Nothing matched" and "some relocations failed" are not errors: they are
//! ordinary outcomes reported by the publish operation.

use std::path::PathBuf;

/// Top-level error type for all spritevault operations.
#[derive(Debug, thiserror::Error)]
pub enum SpriteVaultError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transient failure talking to the remote tree store.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The archive folder could not be reached; nothing was mutated.
    #[error("archive folder '{folder}' unreachable: {reason}")]
    ArchiveUnreachable { folder: String, reason: String },

    /// The published-stage upload failed after staging had succeeded.
    #[error("workflow inconsistency for submission {submission}: {reason}")]
    WorkflowInconsistency { submission: String, reason: String },

    /// Database / catalog layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad sprite name, malformed timestamp, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A category name that is not part of the configured folder tree.
    #[error("unknown category '{0}'")]
    UnknownCategory(String),

    /// No persisted submission with this identifier.
    #[error("submission '{0}' not found")]
    SubmissionNotFound(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SpriteVaultError>;

impl SpriteVaultError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same call later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SpriteVaultError::config("missing archive folder");
        assert_eq!(err.to_string(), "config error: missing archive folder");

        let err = SpriteVaultError::ArchiveUnreachable {
            folder: "arch-1".into(),
            reason: "HTTP 404".into(),
        };
        assert!(err.to_string().contains("arch-1"));
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[test]
    fn transient_classification() {
        assert!(SpriteVaultError::StoreUnavailable("timeout".into()).is_transient());
        assert!(!SpriteVaultError::UnknownCategory("blocks".into()).is_transient());
        assert!(
            !SpriteVaultError::WorkflowInconsistency {
                submission: "s".into(),
                reason: "r".into(),
            }
            .is_transient()
        );
    }
}
