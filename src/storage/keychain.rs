//! Keychain-based token storage.
//!
//! Feature-gated behind `system-keyring`. Native stores are compiled in for
//! macOS (Keychain) and Windows (Credential Manager); on Linux the secret
//! service is reached through [`super::SecretHelperBackend`] instead.

#[cfg(feature = "system-keyring")]
use tracing::{debug, instrument};

#[cfg(feature = "system-keyring")]
use super::{ACCOUNT_NAME, SERVICE_NAME, StorageBackend, TokenBackend, parse_token};
#[cfg(feature = "system-keyring")]
use crate::error::{Result, TokenError};
#[cfg(feature = "system-keyring")]
use crate::token::Token;

/// Keychain-based token storage.
///
/// The token is serialized to JSON and stored as the password of a single
/// entry (`service`, `account`). The platform API replaces the secret
/// atomically.
#[cfg(feature = "system-keyring")]
#[derive(Debug)]
pub struct KeychainTokenBackend {
    entry: keyring::Entry,
    service: String,
    account: String,
}

#[cfg(feature = "system-keyring")]
impl KeychainTokenBackend {
    /// Open the default entry (`credkeep` / `oauth-token`).
    pub fn new() -> Result<Self> {
        Self::with_service(SERVICE_NAME)
    }

    /// Open the entry under a custom service name.
    pub fn with_service(service: impl Into<String>) -> Result<Self> {
        let service = service.into();
        let entry = keyring::Entry::new(&service, ACCOUNT_NAME)
            .map_err(|e| TokenError::unavailable("keychain", format!("Failed to open entry: {e}")))?;
        Ok(Self {
            entry,
            service,
            account: ACCOUNT_NAME.to_string(),
        })
    }

    /// Wrap an already-built entry (mock credentials in tests).
    pub fn from_entry(entry: keyring::Entry, service: impl Into<String>) -> Self {
        Self {
            entry,
            service: service.into(),
            account: ACCOUNT_NAME.to_string(),
        }
    }

    /// Whether a native keychain is compiled in and answers a read.
    ///
    /// "No entry" counts as reachable: the store responded.
    pub fn is_available(service: &str) -> bool {
        if !cfg!(any(target_os = "macos", target_os = "windows")) {
            return false;
        }
        match keyring::Entry::new(service, ACCOUNT_NAME) {
            Ok(entry) => Self::probe_entry(&entry),
            Err(_) => false,
        }
    }

    fn probe_entry(entry: &keyring::Entry) -> bool {
        match entry.get_password() {
            Ok(_) => true,
            Err(keyring::Error::NoEntry) => true,
            Err(keyring::Error::NoStorageAccess(_)) => false,
            Err(keyring::Error::PlatformFailure(_)) => false,
            Err(_) => true,
        }
    }

    fn map_error(e: keyring::Error) -> TokenError {
        TokenError::unavailable("keychain", e.to_string())
    }
}

#[cfg(feature = "system-keyring")]
impl TokenBackend for KeychainTokenBackend {
    #[instrument(skip(self), fields(service = %self.service))]
    fn load(&self) -> Result<Option<Token>> {
        match self.entry.get_password() {
            Ok(password) => {
                let password = zeroize::Zeroizing::new(password);
                parse_token(&password, &self.location()).map(Some)
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::BadEncoding(_)) => Err(TokenError::corrupt(
                self.location(),
                "stored secret is not valid UTF-8",
            )),
            Err(e) => Err(Self::map_error(e)),
        }
    }

    #[instrument(skip(self, token), fields(service = %self.service))]
    fn save(&self, token: &Token) -> Result<()> {
        let json = zeroize::Zeroizing::new(serde_json::to_string(token).map_err(|e| {
            TokenError::unavailable("keychain", format!("Failed to serialize token: {e}"))
        })?);
        self.entry.set_password(&json).map_err(Self::map_error)?;
        debug!("token saved to keychain");
        Ok(())
    }

    #[instrument(skip(self), fields(service = %self.service))]
    fn remove(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Self::map_error(e)),
        }
    }

    fn kind(&self) -> StorageBackend {
        StorageBackend::Keychain
    }

    fn location(&self) -> String {
        format!("keychain:{}/{}", self.service, self.account)
    }
}
