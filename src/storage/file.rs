//! File-based token storage.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use zeroize::Zeroizing;

use super::{StorageBackend, TokenBackend, parse_token_file};
use crate::error::{Result, TokenError};
use crate::token::Token;

/// File name of the credential inside the config directory.
pub const TOKEN_FILE_NAME: &str = "token.json";

/// File permissions for token files (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// File-based token storage, the universal fallback.
///
/// Stores the token as pretty-printed JSON at `{dir}/token.json`.
///
/// # Security
/// - The file is created with 0600 permissions on Unix, before any byte
///   is written
/// - The parent directory is created with 0700 permissions
/// - Writes go to a temp file in the same directory, are fsynced, then
///   renamed over the destination, so a crash never leaves a truncated
///   credential in place
#[derive(Debug, Clone)]
pub struct FileTokenBackend {
    path: PathBuf,
}

impl FileTokenBackend {
    /// Store the token at `{dir}/token.json`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(TOKEN_FILE_NAME),
        }
    }

    /// Store the token at an exact file path.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| TOKEN_FILE_NAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Ensure the storage directory exists with correct permissions.
    ///
    /// An existing directory that group or others can access is tightened
    /// to 0700 as well. Sticky shared directories such as `/tmp` are left alone.
    fn ensure_dir(&self) -> Result<()> {
        let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) else {
            return Ok(());
        };
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| {
                TokenError::io(
                    format!("Failed to create token directory '{}'", dir.display()),
                    e,
                )
            })?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir)
                .map_err(|e| {
                    TokenError::io(format!("Failed to stat token directory '{}'", dir.display()), e)
                })?
                .permissions()
                .mode();
            if mode & 0o077 != 0 && mode & 0o1000 == 0 {
                let perms = std::fs::Permissions::from_mode(DIR_MODE);
                std::fs::set_permissions(dir, perms).map_err(|e| {
                    TokenError::io(
                        format!("Failed to set directory permissions on '{}'", dir.display()),
                        e,
                    )
                })?;
                debug!(dir = %dir.display(), "tightened token directory permissions");
            }
        }
        Ok(())
    }

    fn write_temp(&self, temp_path: &Path, content: &[u8]) -> Result<()> {
        use std::io::Write;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(FILE_MODE);
        }

        let mut file = options.open(temp_path).map_err(|e| {
            TokenError::io(
                format!("Failed to create temp file '{}'", temp_path.display()),
                e,
            )
        })?;

        // A stale temp file from a crashed run keeps its old mode; reset it.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(FILE_MODE))
                .map_err(|e| {
                    TokenError::io(
                        format!("Failed to set permissions on '{}'", temp_path.display()),
                        e,
                    )
                })?;
        }

        file.write_all(content).map_err(|e| {
            TokenError::io(
                format!("Failed to write temp file '{}'", temp_path.display()),
                e,
            )
        })?;
        file.sync_all().map_err(|e| {
            TokenError::io(
                format!("Failed to sync temp file '{}'", temp_path.display()),
                e,
            )
        })
    }
}

impl TokenBackend for FileTokenBackend {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> Result<Option<Token>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => Zeroizing::new(c),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(TokenError::corrupt_file(&self.path, "not valid UTF-8"));
            }
            Err(e) => {
                return Err(TokenError::io(
                    format!("Failed to read token file '{}'", self.path.display()),
                    e,
                ));
            }
        };

        parse_token_file(&content, &self.path).map(Some)
    }

    #[instrument(skip(self, token), fields(path = %self.path.display()))]
    fn save(&self, token: &Token) -> Result<()> {
        self.ensure_dir()?;

        let content = Zeroizing::new(serde_json::to_string_pretty(token).map_err(|e| {
            TokenError::io(
                "Failed to serialize token",
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?);

        let temp_path = self.temp_path();
        if let Err(e) = self.write_temp(&temp_path, content.as_bytes()) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        // Atomic rename
        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(TokenError::io(
                format!(
                    "Failed to rename '{}' to '{}'",
                    temp_path.display(),
                    self.path.display()
                ),
                e,
            ));
        }

        debug!("token saved");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TokenError::io(
                format!("Failed to remove token file '{}'", self.path.display()),
                e,
            )),
        }
    }

    fn kind(&self) -> StorageBackend {
        StorageBackend::File
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
