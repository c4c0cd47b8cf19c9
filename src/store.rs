//! Token store facade.
//!
//! [`TokenStore`] is the one object the rest of the program talks to. It
//! owns the backend chosen at startup and never switches to another one,
//! even when a native store call fails.

use tracing::{debug, instrument, warn};

use crate::error::{Result, TokenError};
use crate::storage::{StorageBackend, TokenBackend};
use crate::token::Token;

/// Stable facade over the selected [`TokenBackend`].
pub struct TokenStore {
    backend: Box<dyn TokenBackend>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("backend", &self.backend.kind())
            .field("location", &self.backend.location())
            .finish()
    }
}

impl TokenStore {
    pub fn new(backend: impl TokenBackend + 'static) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    pub fn from_boxed(backend: Box<dyn TokenBackend>) -> Self {
        Self { backend }
    }

    /// Read the stored token.
    ///
    /// Returns [`TokenError::NotFound`] when nothing is stored.
    #[instrument(skip(self), fields(backend = %self.backend.kind()))]
    pub fn get(&self) -> Result<Token> {
        self.backend.load()?.ok_or(TokenError::NotFound)
    }

    /// Replace the stored token.
    #[instrument(skip(self, token), fields(backend = %self.backend.kind()))]
    pub fn set(&self, token: &Token) -> Result<()> {
        self.backend.save(token)?;
        debug!("token persisted");
        Ok(())
    }

    /// Persist a refreshed token, keeping the stored refresh token when the
    /// new one has none. Returns what was written.
    pub fn update(&self, token: &Token) -> Result<Token> {
        self.update_from(token, None)
    }

    /// Like [`update`](Self::update), but takes the refresh token from
    /// `previous` when it has one, skipping the backend read.
    #[instrument(skip_all, fields(backend = %self.backend.kind()))]
    pub fn update_from(&self, token: &Token, previous: Option<&Token>) -> Result<Token> {
        let merged = if token.has_refresh_token() {
            token.clone()
        } else if let Some(previous) = previous.filter(|t| t.has_refresh_token()) {
            token.clone().merge_refresh_token(Some(previous))
        } else {
            let stored = match self.backend.load() {
                Ok(stored) => stored,
                Err(TokenError::CorruptToken { location, .. }) => {
                    warn!(%location, "replacing corrupt stored token");
                    None
                }
                Err(e) => return Err(e),
            };
            token.clone().merge_refresh_token(stored.as_ref())
        };
        self.set(&merged)?;
        Ok(merged)
    }

    /// Remove the stored token. Succeeds when nothing is stored.
    #[instrument(skip(self), fields(backend = %self.backend.kind()))]
    pub fn delete(&self) -> Result<()> {
        self.backend.remove()
    }

    pub fn current_backend(&self) -> StorageBackend {
        self.backend.kind()
    }

    /// Where the active backend keeps the token, for diagnostics.
    pub fn location(&self) -> String {
        self.backend.location()
    }

    // -- CLI-facing queries --

    /// Whether a usable token is stored. Any failure reads as "no".
    pub fn has_token(&self) -> bool {
        match self.get() {
            Ok(_) => true,
            Err(TokenError::NotFound) => false,
            Err(e) => {
                warn!(error = %e, "could not read stored token");
                false
            }
        }
    }

    pub fn get_token(&self) -> Result<Token> {
        self.get()
    }

    pub fn delete_token(&self) -> Result<()> {
        self.delete()
    }

    pub fn active_backend(&self) -> StorageBackend {
        self.current_backend()
    }

    pub fn is_secure_storage(&self) -> bool {
        self.current_backend().is_secure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileTokenBackend, MemoryTokenBackend};

    fn memory_store() -> (TokenStore, MemoryTokenBackend) {
        let backend = MemoryTokenBackend::new();
        (TokenStore::new(backend.clone()), backend)
    }

    #[test]
    fn test_get_empty_is_not_found() {
        let (store, _) = memory_store();
        assert!(store.get().unwrap_err().is_not_found());
        assert!(!store.has_token());
    }

    #[test]
    fn test_set_then_get() {
        let (store, _) = memory_store();
        let token = Token::new("a1", "r1", "Bearer");
        store.set(&token).unwrap();
        assert_eq!(store.get().unwrap(), token);
        assert_eq!(store.get_token().unwrap(), token);
        assert!(store.has_token());
    }

    #[test]
    fn test_set_replaces_wholesale() {
        let (store, _) = memory_store();
        store.set(&Token::new("a1", "r1", "Bearer")).unwrap();
        store.set(&Token::new("a2", "", "Bearer")).unwrap();
        assert_eq!(store.get().unwrap().refresh_token, "");
    }

    #[test]
    fn test_update_keeps_stored_refresh_token() {
        let (store, backend) = memory_store();
        store.set(&Token::new("a1", "r1", "Bearer")).unwrap();

        let merged = store.update(&Token::new("a2", "", "Bearer")).unwrap();
        assert_eq!(merged.access_token, "a2");
        assert_eq!(merged.refresh_token, "r1");
        assert_eq!(backend.snapshot().unwrap(), merged);
    }

    #[test]
    fn test_update_prefers_new_refresh_token() {
        let (store, _) = memory_store();
        store.set(&Token::new("a1", "r1", "Bearer")).unwrap();
        let merged = store.update(&Token::new("a2", "r2", "Bearer")).unwrap();
        assert_eq!(merged.refresh_token, "r2");
    }

    #[test]
    fn test_update_from_previous_skips_backend() {
        let (store, backend) = memory_store();
        store.set(&Token::new("a0", "r0", "Bearer")).unwrap();

        let previous = Token::new("a1", "r1", "Bearer");
        let merged = store
            .update_from(&Token::new("a2", "", "Bearer"), Some(&previous))
            .unwrap();
        assert_eq!(merged.refresh_token, "r1");
        assert_eq!(backend.snapshot().unwrap(), merged);

        // A previous token without a refresh token falls back to the store.
        let merged = store
            .update_from(&Token::new("a3", "", "Bearer"), Some(&Token::new("a2", "", "Bearer")))
            .unwrap();
        assert_eq!(merged.refresh_token, "r1");
    }

    #[test]
    fn test_delete_idempotent() {
        let (store, _) = memory_store();
        store.delete().unwrap();
        store.set(&Token::new("a1", "r1", "Bearer")).unwrap();
        store.delete_token().unwrap();
        store.delete_token().unwrap();
        assert!(store.get().unwrap_err().is_not_found());
    }

    #[test]
    fn test_has_token_false_on_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileTokenBackend::new(dir.path());
        std::fs::write(backend.path(), "{\"access_token\":").unwrap();
        let store = TokenStore::new(backend);

        assert!(!store.has_token());
        assert!(matches!(store.get(), Err(TokenError::CorruptToken { .. })));
    }

    #[test]
    fn test_update_overwrites_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileTokenBackend::new(dir.path());
        std::fs::write(backend.path(), "garbage").unwrap();
        let store = TokenStore::new(backend);

        store.update(&Token::new("a1", "", "Bearer")).unwrap();
        assert_eq!(store.get().unwrap().access_token, "a1");
    }

    #[test]
    fn test_backend_queries() {
        let store = TokenStore::new(MemoryTokenBackend::with_kind(StorageBackend::SecretHelper));
        assert_eq!(store.current_backend(), StorageBackend::SecretHelper);
        assert_eq!(store.active_backend(), StorageBackend::SecretHelper);
        assert!(store.is_secure_storage());

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(FileTokenBackend::new(dir.path()));
        assert!(!store.is_secure_storage());
        assert!(store.location().ends_with("token.json"));
    }
}
