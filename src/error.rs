//! Error types for credential storage.

use std::path::PathBuf;

/// Errors that can occur while storing, loading, refreshing or migrating
/// the OAuth credential.
///
/// No variant ever carries token material. Parse failures are described
/// by serde's error category and the line/column of the failure only;
/// serde's own message is dropped because it may quote the offending value.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// No token is persisted in the active backend.
    #[error("No stored credential found; run the login command to authorize")]
    NotFound,

    /// Persisted bytes exist but could not be parsed as a token.
    #[error("Stored credential at '{location}' is corrupt: {reason}")]
    CorruptToken {
        location: String,
        reason: String,
        /// Set only when the corrupt bytes live in a file on disk.
        path: Option<PathBuf>,
    },

    /// A native secret-store call failed after the backend was selected.
    #[error("{backend} backend unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// Disk I/O failed (write, rename, erase...).
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The upstream provider token source failed.
    #[error("Token source error: {0}")]
    Upstream(String),
}

impl TokenError {
    /// Whether this error means "never configured" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub(crate) fn corrupt(location: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::CorruptToken {
            location: location.into(),
            reason: err.to_string(),
            path: None,
        }
    }

    pub(crate) fn corrupt_file(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::CorruptToken {
            location: path.display().to_string(),
            reason: err.to_string(),
            path: Some(path.to_path_buf()),
        }
    }

    /// Describe a JSON parse failure without quoting any of the input.
    pub(crate) fn json_reason(err: &serde_json::Error) -> String {
        use serde_json::error::Category;

        let category = match err.classify() {
            Category::Io => "I/O error",
            Category::Syntax => "invalid JSON",
            Category::Data => "unexpected token shape",
            Category::Eof => "truncated JSON",
        };
        format!("{category} at line {} column {}", err.line(), err.column())
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Path of the corrupt file. `None` for keychain and helper entries.
    pub fn corrupt_path(&self) -> Option<PathBuf> {
        match self {
            Self::CorruptToken { path, .. } => path.clone(),
            _ => None,
        }
    }
}

pub type Result<T, E = TokenError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_distinct_from_corrupt() {
        assert!(TokenError::NotFound.is_not_found());
        let corrupt = TokenError::corrupt_file(
            std::path::Path::new("/tmp/token.json"),
            "expected value at line 1 column 1",
        );
        assert!(!corrupt.is_not_found());
        assert_eq!(corrupt.corrupt_path(), Some(PathBuf::from("/tmp/token.json")));
    }

    #[test]
    fn test_corrupt_path_only_for_files() {
        let keychain = TokenError::corrupt("keychain:credkeep/oauth-token", "empty");
        assert_eq!(keychain.corrupt_path(), None);

        let helper = TokenError::corrupt("secret-tool service=credkeep account=oauth-token", "empty");
        assert_eq!(helper.corrupt_path(), None);
        assert_eq!(TokenError::NotFound.corrupt_path(), None);
    }

    #[test]
    fn test_json_reason_does_not_quote_input() {
        let raw = r#"{"access_token": "ya29.SUPER-SECRET-ACCESS", "expiry": 12345}"#;
        let err = serde_json::from_str::<crate::token::Token>(raw).unwrap_err();
        let reason = TokenError::json_reason(&err);
        assert!(!reason.contains("SUPER-SECRET"), "{reason}");
        assert!(!reason.contains("12345"), "{reason}");
        assert!(reason.contains("line 1"), "{reason}");

        let err = serde_json::from_str::<crate::token::Token>(r#"{"access_token": "ya29.SECRET"#)
            .unwrap_err();
        let reason = TokenError::json_reason(&err);
        assert!(reason.starts_with("truncated JSON"), "{reason}");
        assert!(!reason.contains("ya29"), "{reason}");
    }

    #[test]
    fn test_messages_name_location() {
        let err = TokenError::corrupt("/home/u/.config/credkeep/token.json", "EOF while parsing");
        let msg = err.to_string();
        assert!(msg.contains("/home/u/.config/credkeep/token.json"));
        assert!(msg.contains("EOF while parsing"));

        let err = TokenError::unavailable("keychain", "locked");
        assert_eq!(err.to_string(), "keychain backend unavailable: locked");
    }

    #[test]
    fn test_io_keeps_source() {
        use std::error::Error as _;
        let err = TokenError::io(
            "Failed to write '/x'",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Failed to write '/x'"));
    }
}
