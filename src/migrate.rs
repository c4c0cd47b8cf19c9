//! One-shot import of a legacy plaintext token file.
//!
//! Older releases kept the credential only in a plaintext JSON file. When
//! the active backend is empty and that file exists, its token is moved
//! into the backend and the file is securely erased. Nothing else is left
//! behind: no backup, no renamed copy.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};
use zeroize::Zeroizing;

use crate::erase::secure_erase;
use crate::error::{Result, TokenError};
use crate::storage::parse_token_file;
use crate::store::TokenStore;

/// What a migration run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The store already held a token; the legacy file was not touched.
    AlreadyPresent,
    /// No legacy file to import.
    NoLegacyFile,
    /// The legacy token was imported and the file erased.
    Imported { from: PathBuf },
}

impl std::fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyPresent => write!(f, "token already present in active backend"),
            Self::NoLegacyFile => write!(f, "no legacy token file found"),
            Self::Imported { from } => write!(f, "imported token from {}", from.display()),
        }
    }
}

/// Removes the legacy file once its token is safely stored.
pub type EraseFn = fn(&Path) -> Result<()>;

/// Imports the legacy token file into a [`TokenStore`].
#[derive(Clone)]
pub struct Migrator {
    legacy_path: PathBuf,
    erase: EraseFn,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("legacy_path", &self.legacy_path)
            .finish_non_exhaustive()
    }
}

impl Migrator {
    pub fn new(legacy_path: impl Into<PathBuf>) -> Self {
        Self {
            legacy_path: legacy_path.into(),
            erase: secure_erase,
        }
    }

    /// Replace the erase step, e.g. to exercise erase failures.
    pub fn with_eraser(mut self, erase: EraseFn) -> Self {
        self.erase = erase;
        self
    }

    pub fn legacy_path(&self) -> &Path {
        &self.legacy_path
    }

    /// Import the legacy token if the store is empty.
    ///
    /// A store read error other than "not found" aborts the run so a
    /// transient keychain failure never causes an overwrite.
    #[instrument(skip(self, store), fields(legacy = %self.legacy_path.display()))]
    pub fn migrate(&self, store: &TokenStore) -> Result<MigrationOutcome> {
        match store.get() {
            Ok(_) => return Ok(MigrationOutcome::AlreadyPresent),
            Err(TokenError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let raw = match std::fs::read_to_string(&self.legacy_path) {
            Ok(raw) => Zeroizing::new(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MigrationOutcome::NoLegacyFile);
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(TokenError::corrupt_file(&self.legacy_path, "not valid UTF-8"));
            }
            Err(e) => {
                return Err(TokenError::io(
                    format!("Failed to read legacy token '{}'", self.legacy_path.display()),
                    e,
                ));
            }
        };

        // An empty legacy file is corrupt, not absent: it stays for inspection.
        let token = parse_token_file(&raw, &self.legacy_path)?;

        store.set(&token)?;
        (self.erase)(&self.legacy_path)?;
        info!(backend = %store.current_backend(), "imported legacy token");

        Ok(MigrationOutcome::Imported {
            from: self.legacy_path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileTokenBackend, MemoryTokenBackend, StorageBackend, TokenBackend};
    use crate::token::Token;

    const LEGACY_JSON: &str = r#"{"access_token":"a1","refresh_token":"r1","token_type":"Bearer","expiry":"0001-01-01T00:00:00Z"}"#;

    fn secure_store() -> (TokenStore, MemoryTokenBackend) {
        let backend = MemoryTokenBackend::with_kind(StorageBackend::Keychain);
        (TokenStore::new(backend.clone()), backend)
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_import_and_erase() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("token.json");
        std::fs::write(&legacy, LEGACY_JSON).unwrap();
        let (store, backend) = secure_store();

        let outcome = Migrator::new(&legacy).migrate(&store).unwrap();
        assert_eq!(outcome, MigrationOutcome::Imported { from: legacy.clone() });

        let token = backend.snapshot().unwrap();
        assert_eq!(token, Token::new("a1", "r1", "Bearer"));
        assert!(!legacy.exists());
        assert!(dir_entries(dir.path()).is_empty(), "no backup or sibling left behind");
    }

    #[test]
    fn test_already_present_leaves_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("token.json");
        std::fs::write(&legacy, LEGACY_JSON).unwrap();
        let (store, backend) = secure_store();
        store.set(&Token::new("current", "rc", "Bearer")).unwrap();

        let outcome = Migrator::new(&legacy).migrate(&store).unwrap();
        assert_eq!(outcome, MigrationOutcome::AlreadyPresent);
        assert!(legacy.exists());
        assert_eq!(backend.snapshot().unwrap().access_token, "current");
    }

    #[test]
    fn test_no_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = secure_store();
        let outcome = Migrator::new(dir.path().join("token.json"))
            .migrate(&store)
            .unwrap();
        assert_eq!(outcome, MigrationOutcome::NoLegacyFile);
        assert!(!store.has_token());
    }

    #[test]
    fn test_corrupt_legacy_file_kept() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("token.json");
        std::fs::write(&legacy, "{\"access_token\": ").unwrap();
        let (store, _) = secure_store();

        let err = Migrator::new(&legacy).migrate(&store).unwrap_err();
        assert_eq!(err.corrupt_path(), Some(legacy.clone()));
        assert!(legacy.exists());
        assert!(!store.has_token());
    }

    #[test]
    fn test_empty_legacy_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("token.json");
        let (store, _) = secure_store();

        for content in ["", " \n\t"] {
            std::fs::write(&legacy, content).unwrap();
            let err = Migrator::new(&legacy).migrate(&store).unwrap_err();
            assert!(matches!(err, TokenError::CorruptToken { .. }), "{err:?}");
            assert_eq!(err.corrupt_path(), Some(legacy.clone()));
            assert!(legacy.exists());
            assert!(!store.has_token());
        }
    }

    #[test]
    fn test_corrupt_legacy_reason_hides_secret() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("token.json");
        std::fs::write(&legacy, r#"{"access_token":"ya29.SUPER-SECRET-ACCESS","expiry":7}"#).unwrap();
        let (store, _) = secure_store();

        let err = Migrator::new(&legacy).migrate(&store).unwrap_err();
        assert!(!err.to_string().contains("SUPER-SECRET"), "{err}");
        assert!(legacy.exists());
    }

    #[test]
    fn test_erase_failure_is_reported() {
        fn refuse(path: &Path) -> Result<()> {
            Err(TokenError::io(
                format!("Failed to remove legacy token '{}'", path.display()),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only directory"),
            ))
        }

        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("token.json");
        std::fs::write(&legacy, LEGACY_JSON).unwrap();
        let (store, backend) = secure_store();

        let err = Migrator::new(&legacy)
            .with_eraser(refuse)
            .migrate(&store)
            .unwrap_err();
        assert!(matches!(err, TokenError::Io { .. }), "{err:?}");
        // The token is already stored; only the plaintext copy lingers.
        assert_eq!(backend.snapshot().unwrap().access_token, "a1");
        assert!(legacy.exists());
    }

    #[test]
    fn test_same_path_as_file_backend_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileTokenBackend::new(dir.path());
        backend.save(&Token::new("a1", "r1", "Bearer")).unwrap();
        let live = backend.path().to_path_buf();
        let store = TokenStore::new(backend);

        let outcome = Migrator::new(&live).migrate(&store).unwrap();
        assert_eq!(outcome, MigrationOutcome::AlreadyPresent);
        assert_eq!(store.get().unwrap().access_token, "a1");
        assert!(live.exists());
    }

    #[test]
    fn test_store_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let live = FileTokenBackend::new(dir.path());
        std::fs::write(live.path(), "not json").unwrap();
        let store = TokenStore::new(live);

        let legacy = dir.path().join("old-token.json");
        std::fs::write(&legacy, LEGACY_JSON).unwrap();

        assert!(Migrator::new(&legacy).migrate(&store).is_err());
        assert!(legacy.exists());
    }

    #[test]
    fn test_second_run_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("token.json");
        std::fs::write(&legacy, LEGACY_JSON).unwrap();
        let (store, _) = secure_store();
        let migrator = Migrator::new(&legacy);

        migrator.migrate(&store).unwrap();
        assert_eq!(migrator.migrate(&store).unwrap(), MigrationOutcome::AlreadyPresent);
    }
}
