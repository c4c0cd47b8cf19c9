//! Token storage backends.
//!
//! Provides the [`TokenBackend`] trait and its implementations:
//! - [`FileTokenBackend`] - JSON file restricted to the owning user
//! - [`KeychainTokenBackend`] - OS keychain (requires `system-keyring` feature)
//! - [`SecretHelperBackend`] - libsecret `secret-tool` helper process
//! - [`MemoryTokenBackend`] - in-memory storage for tests
//!
//! All operations are synchronous. Each backend holds at most one token.

pub mod file;
pub mod keychain;
pub mod memory;
pub mod secret_helper;

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TokenError};
use crate::token::Token;

pub use file::FileTokenBackend;
#[cfg(feature = "system-keyring")]
pub use keychain::KeychainTokenBackend;
pub use memory::MemoryTokenBackend;
pub use secret_helper::{CommandRunner, HelperOutput, SecretHelperBackend, SystemRunner};

/// Keychain service name and helper attribute used for the credential.
pub const SERVICE_NAME: &str = "credkeep";

/// Keychain account / helper attribute identifying the single token entry.
pub const ACCOUNT_NAME: &str = "oauth-token";

// =============================================================================
// StorageBackend
// =============================================================================

/// Which kind of backend holds the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    /// OS keychain (macOS Keychain, Windows Credential Manager).
    Keychain,
    /// Secret-service daemon reached through a helper binary.
    SecretHelper,
    /// Plain JSON file, owner-only permissions.
    File,
}

impl StorageBackend {
    /// Whether the backend is protected by a native platform secret store.
    pub fn is_secure(self) -> bool {
        matches!(self, Self::Keychain | Self::SecretHelper)
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keychain => write!(f, "keychain"),
            Self::SecretHelper => write!(f, "secret-helper"),
            Self::File => write!(f, "file"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "keychain" | "keyring" => Ok(Self::Keychain),
            "secret-helper" | "secret-service" => Ok(Self::SecretHelper),
            "file" => Ok(Self::File),
            _ => Err(format!("Unknown storage backend: {s}")),
        }
    }
}

// =============================================================================
// TokenBackend trait
// =============================================================================

/// Contract shared by every storage backend.
///
/// Implementations must be thread-safe (`Send + Sync`). `save` fully
/// replaces any previous value and must never leave a partially written
/// credential readable as valid. `remove` is idempotent.
pub trait TokenBackend: Send + Sync {
    /// Load the stored token, `Ok(None)` when nothing is stored.
    fn load(&self) -> Result<Option<Token>>;

    /// Save the token, replacing any previous value.
    fn save(&self, token: &Token) -> Result<()>;

    /// Remove the stored token. Removing nothing is not an error.
    fn remove(&self) -> Result<()>;

    /// Check whether a token is stored.
    fn exists(&self) -> Result<bool> {
        Ok(self.load()?.is_some())
    }

    /// The backend kind, for diagnostics and the secure/best-effort split.
    fn kind(&self) -> StorageBackend;

    /// Human-readable location (path, keychain entry...). Never secret.
    fn location(&self) -> String;
}

impl<T: TokenBackend + ?Sized> TokenBackend for Arc<T> {
    fn load(&self) -> Result<Option<Token>> {
        (**self).load()
    }
    fn save(&self, token: &Token) -> Result<()> {
        (**self).save(token)
    }
    fn remove(&self) -> Result<()> {
        (**self).remove()
    }
    fn exists(&self) -> Result<bool> {
        (**self).exists()
    }
    fn kind(&self) -> StorageBackend {
        (**self).kind()
    }
    fn location(&self) -> String {
        (**self).location()
    }
}

impl<T: TokenBackend + ?Sized> TokenBackend for Box<T> {
    fn load(&self) -> Result<Option<Token>> {
        (**self).load()
    }
    fn save(&self, token: &Token) -> Result<()> {
        (**self).save(token)
    }
    fn remove(&self) -> Result<()> {
        (**self).remove()
    }
    fn exists(&self) -> Result<bool> {
        (**self).exists()
    }
    fn kind(&self) -> StorageBackend {
        (**self).kind()
    }
    fn location(&self) -> String {
        (**self).location()
    }
}

/// Decode a serialized token. The error is a reason that never quotes `raw`.
fn decode_token(raw: &str) -> std::result::Result<Token, String> {
    if raw.trim().is_empty() {
        return Err("stored value is empty".to_string());
    }
    serde_json::from_str(raw).map_err(|e| TokenError::json_reason(&e))
}

/// Parse a token read from a secret store entry. Blank input is corrupt:
/// an absent entry is reported by the store itself, not by empty bytes.
pub(crate) fn parse_token(raw: &str, location: &str) -> Result<Token> {
    decode_token(raw).map_err(|reason| TokenError::corrupt(location, reason))
}

/// Parse a token read from a file on disk.
pub(crate) fn parse_token_file(raw: &str, path: &std::path::Path) -> Result<Token> {
    decode_token(raw).map_err(|reason| TokenError::corrupt_file(path, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("keychain".parse::<StorageBackend>().unwrap(), StorageBackend::Keychain);
        assert_eq!("keyring".parse::<StorageBackend>().unwrap(), StorageBackend::Keychain);
        assert_eq!(
            "secret_helper".parse::<StorageBackend>().unwrap(),
            StorageBackend::SecretHelper
        );
        assert_eq!("FILE".parse::<StorageBackend>().unwrap(), StorageBackend::File);
        assert!("floppy".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_storage_backend_display_round_trips() {
        for kind in [
            StorageBackend::Keychain,
            StorageBackend::SecretHelper,
            StorageBackend::File,
        ] {
            assert_eq!(kind.to_string().parse::<StorageBackend>().unwrap(), kind);
        }
    }

    #[test]
    fn test_is_secure() {
        assert!(StorageBackend::Keychain.is_secure());
        assert!(StorageBackend::SecretHelper.is_secure());
        assert!(!StorageBackend::File.is_secure());
    }

    #[test]
    fn test_parse_token_blank_is_corrupt() {
        for raw in ["", "  \n"] {
            match parse_token(raw, "keychain:credkeep") {
                Err(TokenError::CorruptToken { location, .. }) => {
                    assert_eq!(location, "keychain:credkeep");
                }
                other => panic!("expected CorruptToken, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_token_garbage_is_corrupt() {
        let err = parse_token("not json", "keychain:credkeep").unwrap_err();
        assert!(matches!(err, TokenError::CorruptToken { .. }));
        assert_eq!(err.corrupt_path(), None);
    }

    #[test]
    fn test_parse_token_reason_hides_value() {
        let raw = r#"{"access_token": "ya29.SUPER-SECRET-ACCESS", "expiry": 12345}"#;
        let err = parse_token(raw, "keychain:credkeep").unwrap_err();
        let msg = err.to_string();
        assert!(!msg.contains("SUPER-SECRET"), "{msg}");
        assert!(!msg.contains("12345"), "{msg}");

        let path = std::path::Path::new("/tmp/credkeep/token.json");
        let err = parse_token_file(raw, path).unwrap_err();
        assert!(!err.to_string().contains("SUPER-SECRET"));
        assert_eq!(err.corrupt_path(), Some(path.to_path_buf()));
    }

    #[test]
    fn test_box_dyn_backend() {
        let backend: Box<dyn TokenBackend> = Box::new(MemoryTokenBackend::new());
        backend.save(&Token::new("a", "r", "Bearer")).unwrap();
        assert_eq!(backend.load().unwrap().unwrap().access_token, "a");
        assert!(backend.exists().unwrap());
    }

    #[test]
    fn test_arc_backend() {
        let backend = Arc::new(MemoryTokenBackend::new());
        backend.save(&Token::new("a", "r", "Bearer")).unwrap();
        assert_eq!(backend.load().unwrap().unwrap().access_token, "a");
        assert_eq!(backend.kind(), StorageBackend::File);
    }
}
