//! In-memory token storage.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::instrument;

use super::{StorageBackend, TokenBackend};
use crate::error::Result;
use crate::token::Token;

/// In-memory token storage.
///
/// Clones share the same slot. Useful for tests and ephemeral sessions; the
/// reported [`StorageBackend`] kind is chosen at construction so tests can
/// stand in for a secure store.
#[derive(Debug, Clone)]
pub struct MemoryTokenBackend {
    inner: Arc<RwLock<Option<Token>>>,
    kind: StorageBackend,
}

impl Default for MemoryTokenBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenBackend {
    /// Empty storage reporting itself as [`StorageBackend::File`].
    pub fn new() -> Self {
        Self::with_kind(StorageBackend::File)
    }

    /// Empty storage reporting the given kind.
    pub fn with_kind(kind: StorageBackend) -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            kind,
        }
    }

    /// Storage pre-populated with a token.
    pub fn with_token(self, token: Token) -> Self {
        *self.inner.write() = Some(token);
        self
    }

    /// Current contents, bypassing the trait.
    pub fn snapshot(&self) -> Option<Token> {
        self.inner.read().clone()
    }
}

impl TokenBackend for MemoryTokenBackend {
    #[instrument(skip(self))]
    fn load(&self) -> Result<Option<Token>> {
        Ok(self.inner.read().clone())
    }

    #[instrument(skip(self, token))]
    fn save(&self, token: &Token) -> Result<()> {
        *self.inner.write() = Some(token.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove(&self) -> Result<()> {
        *self.inner.write() = None;
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.inner.read().is_some())
    }

    fn kind(&self) -> StorageBackend {
        self.kind
    }

    fn location(&self) -> String {
        format!("memory ({})", self.kind)
    }
}
