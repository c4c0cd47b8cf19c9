//! Zero-overwrite-then-unlink for files that held secrets.
//!
//! This is a best-effort mitigation. Copy-on-write and journaling
//! filesystems, SSD wear levelling, snapshots and backups may all keep older
//! copies of the bytes. It only guarantees that the live file no longer
//! contains the plaintext secret at the moment it is unlinked.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, instrument};

use crate::error::{Result, TokenError};

/// Overwrite chunk size.
const CHUNK: usize = 8 * 1024;

/// Overwrite `path` with zeros, flush it to stable storage, then unlink it.
///
/// Erasing a path that does not exist succeeds, so callers never need to
/// check for existence first.
#[instrument]
pub fn secure_erase(path: &Path) -> Result<()> {
    let mut file = match OpenOptions::new().write(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("nothing to erase");
            return Ok(());
        }
        Err(e) => {
            return Err(TokenError::io(
                format!("Failed to open '{}' for erasure", path.display()),
                e,
            ));
        }
    };

    let len = file
        .metadata()
        .map_err(|e| TokenError::io(format!("Failed to stat '{}'", path.display()), e))?
        .len();

    file.seek(SeekFrom::Start(0))
        .map_err(|e| TokenError::io(format!("Failed to seek '{}'", path.display()), e))?;

    let zeros = [0u8; CHUNK];
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(CHUNK as u64) as usize;
        file.write_all(&zeros[..n])
            .map_err(|e| TokenError::io(format!("Failed to overwrite '{}'", path.display()), e))?;
        remaining -= n as u64;
    }

    file.sync_all()
        .map_err(|e| TokenError::io(format!("Failed to sync '{}'", path.display()), e))?;
    drop(file);

    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(TokenError::io(
                format!("Failed to remove '{}'", path.display()),
                e,
            ));
        }
    }

    debug!(bytes = len, "erased");
    Ok(())
}
