use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::selector::BackendPreference;
use crate::storage::file::TOKEN_FILE_NAME;
use crate::storage::secret_helper::DEFAULT_HELPER;
use crate::storage::SERVICE_NAME;

/// Directory name under the user's config root.
pub const PRODUCT_NAME: &str = "credkeep";

/// Configuration file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
///
/// The `config` command shows these next to each value so users can tell
/// why a file setting is being ignored.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "storage.backend") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    /// Get all overrides as a map of setting key -> env var name.
    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// `auto`, `keychain`, `secret-helper` or `file`.
    #[serde(default)]
    pub backend: BackendPreference,
    /// Overrides the resolved config directory (where `token.json` lives).
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,
    /// Plaintext token file imported once into the active backend.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_token_path: Option<PathBuf>,
    /// Secret-service helper binary.
    #[serde(default = "default_secret_helper")]
    pub secret_helper: String,
    /// Keychain service name / helper `service` attribute.
    #[serde(default = "default_keychain_service")]
    pub keychain_service: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::default(),
            config_dir: None,
            legacy_token_path: None,
            secret_helper: default_secret_helper(),
            keychain_service: default_keychain_service(),
        }
    }
}

impl StorageConfig {
    /// Directory holding `token.json` and `config.toml`.
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone().unwrap_or_else(default_config_dir)
    }

    /// Path of the file backend's token.
    pub fn token_path(&self) -> PathBuf {
        self.config_dir().join(TOKEN_FILE_NAME)
    }

    /// Historical plaintext token location.
    ///
    /// Defaults to the file backend's own path: before native stores were
    /// supported, `token.json` was the only storage.
    pub fn legacy_token_path(&self) -> PathBuf {
        self.legacy_token_path
            .clone()
            .unwrap_or_else(|| self.token_path())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_secret_helper() -> String {
    DEFAULT_HELPER.to_string()
}
fn default_keychain_service() -> String {
    SERVICE_NAME.to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

/// Config directory for this host: `$XDG_CONFIG_HOME/credkeep`, else
/// `~/.config/credkeep`.
pub fn default_config_dir() -> PathBuf {
    resolve_config_dir(std::env::var_os("XDG_CONFIG_HOME"), dirs::home_dir())
        .unwrap_or_else(|| PathBuf::from(".").join(PRODUCT_NAME))
}

/// Pure resolution rule behind [`default_config_dir`].
///
/// An empty or relative `XDG_CONFIG_HOME` is ignored, matching the XDG base
/// directory rules.
pub fn resolve_config_dir(xdg_config_home: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    xdg_config_home
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| home.map(|h| h.join(".config")))
        .map(|root| root.join(PRODUCT_NAME))
}

// ---------------------------------------------------------------------------
// Config loading and env overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        default_config_dir().join(CONFIG_FILE_NAME)
    }

    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `CREDKEEP_` takes precedence over
    /// the file value and is tracked in `env_overrides`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load the TOML file only. A missing file yields defaults.
    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        if !path.exists() {
            tracing::debug!("Config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        Ok(config)
    }

    /// Save the current (file-level) configuration to a TOML file.
    /// This serializes the config without env overrides applied.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Every supported setting has a corresponding `CREDKEEP_*` variable. When
    /// set, the value replaces the file/default value and the setting key is
    /// recorded in `env_overrides`.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let mut ov = EnvOverrides::default();

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_opt_path {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    $field = if val.is_empty() { None } else { Some(PathBuf::from(val)) };
                    ov.record($key, $env);
                }
            };
        }

        // -- Storage --
        if let Some(val) = lookup("CREDKEEP_STORAGE_BACKEND") {
            match val.parse() {
                Ok(backend) => {
                    self.storage.backend = backend;
                    ov.record("storage.backend", "CREDKEEP_STORAGE_BACKEND");
                }
                Err(e) => tracing::warn!("Ignoring CREDKEEP_STORAGE_BACKEND: {e}"),
            }
        }
        env_opt_path!("storage.config_dir", "CREDKEEP_CONFIG_DIR", self.storage.config_dir);
        env_opt_path!(
            "storage.legacy_token_path",
            "CREDKEEP_LEGACY_TOKEN_PATH",
            self.storage.legacy_token_path
        );
        env_str!(
            "storage.secret_helper",
            "CREDKEEP_SECRET_HELPER",
            self.storage.secret_helper
        );
        env_str!(
            "storage.keychain_service",
            "CREDKEEP_KEYCHAIN_SERVICE",
            self.storage.keychain_service
        );

        // -- Logging --
        env_str!("logging.level", "CREDKEEP_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "CREDKEEP_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
