//! Backend selection.
//!
//! Selection happens once per process in two steps: [`HostProbe::detect`]
//! asks the host which native stores answer, then [`select_backend`] turns
//! the probe results and the configured preference into a backend kind.
//! Only the probe has side effects; selection itself is a pure function.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::error::Result;
use crate::storage::{
    CommandRunner, FileTokenBackend, SecretHelperBackend, StorageBackend, SystemRunner,
    TokenBackend,
};

/// Attribute value used for the availability lookup. Never written.
const PROBE_ACCOUNT: &str = "credkeep-availability-probe";

/// Candidate order when choosing automatically, most secure first.
const FALLBACK_ORDER: [StorageBackend; 3] = [
    StorageBackend::Keychain,
    StorageBackend::SecretHelper,
    StorageBackend::File,
];

/// Which backend the user asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendPreference {
    /// Most secure available backend.
    #[default]
    Auto,
    Keychain,
    SecretHelper,
    File,
}

impl BackendPreference {
    fn requested(self) -> Option<StorageBackend> {
        match self {
            Self::Auto => None,
            Self::Keychain => Some(StorageBackend::Keychain),
            Self::SecretHelper => Some(StorageBackend::SecretHelper),
            Self::File => Some(StorageBackend::File),
        }
    }
}

impl std::fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.requested() {
            None => write!(f, "auto"),
            Some(kind) => write!(f, "{kind}"),
        }
    }
}

impl FromStr for BackendPreference {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        Ok(match s.parse::<StorageBackend>()? {
            StorageBackend::Keychain => Self::Keychain,
            StorageBackend::SecretHelper => Self::SecretHelper,
            StorageBackend::File => Self::File,
        })
    }
}

// =============================================================================
// HostProbe
// =============================================================================

/// Which native secret stores answered on this host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostProbe {
    pub keychain: bool,
    pub secret_helper: bool,
}

impl HostProbe {
    /// A host with no native store.
    pub fn file_only() -> Self {
        Self::default()
    }

    /// Probe the real host.
    pub fn detect(config: &StorageConfig) -> Self {
        let session_bus = std::env::var_os("DBUS_SESSION_BUS_ADDRESS").is_some_and(|v| !v.is_empty());
        Self::detect_with(config, &SystemRunner, session_bus)
    }

    /// Probe with an injected helper runner.
    ///
    /// Nothing is probed when the preference is `file`, so users who opt out
    /// of native stores never trigger an unlock prompt.
    pub fn detect_with(config: &StorageConfig, runner: &dyn CommandRunner, session_bus: bool) -> Self {
        if config.backend == BackendPreference::File {
            return Self::file_only();
        }

        let probe = Self {
            keychain: probe_keychain(&config.keychain_service),
            secret_helper: session_bus
                && probe_secret_helper(runner, &config.secret_helper, &config.keychain_service),
        };
        debug!(
            keychain = probe.keychain,
            secret_helper = probe.secret_helper,
            "probed native secret stores"
        );
        probe
    }

    pub fn is_available(&self, kind: StorageBackend) -> bool {
        match kind {
            StorageBackend::Keychain => self.keychain,
            StorageBackend::SecretHelper => self.secret_helper,
            StorageBackend::File => true,
        }
    }
}

#[cfg(feature = "system-keyring")]
fn probe_keychain(service: &str) -> bool {
    crate::storage::KeychainTokenBackend::is_available(service)
}

#[cfg(not(feature = "system-keyring"))]
fn probe_keychain(_service: &str) -> bool {
    false
}

/// Whether the secret-service helper runs and its daemon answers.
///
/// A lookup that finds nothing (exit 1, empty stderr) still proves the
/// daemon responded.
pub fn probe_secret_helper(runner: &dyn CommandRunner, program: &str, service: &str) -> bool {
    let args = ["lookup", "service", service, "account", PROBE_ACCOUNT];
    match runner.run(program, &args, None) {
        Ok(output) if output.success() || output.is_no_match() => true,
        Ok(output) => {
            debug!(stderr = %output.stderr_text(), "secret helper probe failed");
            false
        }
        Err(e) => {
            debug!(error = %e, "secret helper not runnable");
            false
        }
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Choose the backend for this process.
///
/// An explicit preference wins when available; otherwise the first
/// available kind in Keychain → SecretHelper → File order is used. File is
/// always available, so selection cannot fail.
pub fn select_backend(probe: &HostProbe, preference: BackendPreference) -> StorageBackend {
    if let Some(requested) = preference.requested() {
        if probe.is_available(requested) {
            return requested;
        }
        warn!(
            requested = %requested,
            "requested storage backend unavailable, falling back"
        );
    }

    FALLBACK_ORDER
        .into_iter()
        .find(|kind| probe.is_available(*kind))
        .unwrap_or(StorageBackend::File)
}

/// Construct the backend of the given kind from configuration.
pub fn open_backend(kind: StorageBackend, config: &StorageConfig) -> Result<Box<dyn TokenBackend>> {
    match kind {
        StorageBackend::File => Ok(Box::new(FileTokenBackend::new(config.config_dir()))),
        StorageBackend::SecretHelper => Ok(Box::new(SecretHelperBackend::new(
            config.secret_helper.clone(),
            config.keychain_service.clone(),
            Arc::new(SystemRunner),
        ))),
        #[cfg(feature = "system-keyring")]
        StorageBackend::Keychain => Ok(Box::new(crate::storage::KeychainTokenBackend::with_service(
            config.keychain_service.clone(),
        )?)),
        #[cfg(not(feature = "system-keyring"))]
        StorageBackend::Keychain => Err(crate::error::TokenError::unavailable(
            "keychain",
            "built without the system-keyring feature",
        )),
    }
}
