//! Startup wiring: probe the host, choose a backend, import legacy tokens.
//!
//! Everything here runs once, before any consumer sees the store.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::Result;
use crate::migrate::{MigrationOutcome, Migrator};
use crate::selector::{HostProbe, open_backend, select_backend};
use crate::storage::{StorageBackend, TokenBackend};
use crate::store::TokenStore;

/// A ready-to-use store and what startup did to it.
#[derive(Debug)]
pub struct Bootstrapped {
    pub store: Arc<TokenStore>,
    /// The legacy import result. A failed import does not block startup,
    /// but the error is kept here for the caller to report.
    pub migration: Result<MigrationOutcome>,
}

/// Open the token store for this host.
pub fn open_token_store(config: &StorageConfig) -> Result<Bootstrapped> {
    let probe = HostProbe::detect(config);
    open_token_store_with(config, &probe, open_backend)
}

/// Open the token store with an explicit probe result and backend factory.
///
/// When the selected native backend cannot be constructed the file backend
/// is used instead. Once a backend is open it is never swapped.
pub fn open_token_store_with<F>(config: &StorageConfig, probe: &HostProbe, open: F) -> Result<Bootstrapped>
where
    F: Fn(StorageBackend, &StorageConfig) -> Result<Box<dyn TokenBackend>>,
{
    let kind = select_backend(probe, config.backend);
    let backend = match open(kind, config) {
        Ok(backend) => backend,
        Err(e) if kind != StorageBackend::File => {
            warn!(backend = %kind, error = %e, "failed to open storage backend, using file storage");
            open(StorageBackend::File, config)?
        }
        Err(e) => return Err(e),
    };

    let store = Arc::new(TokenStore::from_boxed(backend));
    info!(
        backend = %store.current_backend(),
        location = %store.location(),
        "token storage ready"
    );

    let migrator = Migrator::new(config.legacy_token_path());
    let migration = migrator.migrate(&store);
    match &migration {
        Ok(outcome) => debug!(%outcome, "legacy migration finished"),
        Err(e) => warn!(error = %e, "legacy token migration failed"),
    }

    Ok(Bootstrapped { store, migration })
}
