//! Token sources and refresh persistence.
//!
//! A [`ProviderTokenSource`] hands out a currently valid token, refreshing it
//! upstream when needed. [`PersistentTokenSource`] wraps any source and
//! writes every new token back to the [`TokenStore`] before returning it,
//! so the next process starts from the refreshed credential.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::error::{Result, TokenError};
use crate::store::TokenStore;
use crate::token::Token;

/// Something that can produce a currently valid token.
pub trait ProviderTokenSource: Send + Sync {
    fn token(&self) -> Result<Token>;
}

impl<T: ProviderTokenSource + ?Sized> ProviderTokenSource for Arc<T> {
    fn token(&self) -> Result<Token> {
        (**self).token()
    }
}

impl<T: ProviderTokenSource + ?Sized> ProviderTokenSource for Box<T> {
    fn token(&self) -> Result<Token> {
        (**self).token()
    }
}

impl<T: ProviderTokenSource + ?Sized> ProviderTokenSource for &T {
    fn token(&self) -> Result<Token> {
        (**self).token()
    }
}

/// Always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: Token,
}

impl StaticTokenSource {
    pub fn new(token: Token) -> Self {
        Self { token }
    }
}

impl ProviderTokenSource for StaticTokenSource {
    fn token(&self) -> Result<Token> {
        Ok(self.token.clone())
    }
}

/// Persists every token the upstream source issues that differs from the
/// last one seen.
///
/// Change detection compares access tokens only. Upstream errors pass
/// through untouched and never trigger a write.
pub struct PersistentTokenSource<S> {
    upstream: S,
    store: Arc<TokenStore>,
    last_known: Mutex<Option<Token>>,
}

impl<S> std::fmt::Debug for PersistentTokenSource<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentTokenSource")
            .field("store", &self.store)
            .field("last_known", &*self.last_known.lock())
            .finish_non_exhaustive()
    }
}

impl<S: ProviderTokenSource> PersistentTokenSource<S> {
    pub fn new(upstream: S, store: Arc<TokenStore>, last_known: Option<Token>) -> Self {
        Self {
            upstream,
            store,
            last_known: Mutex::new(last_known),
        }
    }

    /// Seed the last-known token from whatever the store currently holds.
    ///
    /// An empty store seeds `None`, so the first token issued is persisted.
    pub fn seeded_from_store(upstream: S, store: Arc<TokenStore>) -> Result<Self> {
        let seed = match store.get() {
            Ok(token) => Some(token),
            Err(TokenError::NotFound) => None,
            Err(e) => return Err(e),
        };
        Ok(Self::new(upstream, store, seed))
    }

    /// The token most recently persisted (or seeded).
    pub fn last_known(&self) -> Option<Token> {
        self.last_known.lock().clone()
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }
}

impl<S: ProviderTokenSource> ProviderTokenSource for PersistentTokenSource<S> {
    #[instrument(skip(self))]
    fn token(&self) -> Result<Token> {
        let token = self.upstream.token()?;

        let mut last_known = self.last_known.lock();
        let changed = last_known
            .as_ref()
            .is_none_or(|known| known.access_token != token.access_token);
        if !changed {
            return Ok(token);
        }

        let merged = self.store.update_from(&token, last_known.as_ref())?;
        debug!(backend = %self.store.current_backend(), "persisted refreshed token");
        *last_known = Some(merged);
        Ok(token)
    }
}
