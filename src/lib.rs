//! Credkeep -- persistent OAuth credential storage for command-line tools.
//!
//! A single bearer token is kept in the most secure store the host offers
//! (OS keychain, secret-service helper, or an owner-only JSON file),
//! refreshed tokens are written back transparently, and legacy plaintext
//! token files are imported once and erased.
//!
//! ```no_run
//! use credkeep::bootstrap::open_token_store;
//! use credkeep::config::Config;
//!
//! let config = Config::load(&Config::default_path())?;
//! let boot = open_token_store(&config.storage)?;
//! println!("token stored: {}", boot.store.has_token());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod bootstrap;
pub mod config;
pub mod erase;
pub mod error;
pub mod http;
pub mod migrate;
pub mod selector;
pub mod source;
pub mod storage;
pub mod store;
pub mod token;

pub use error::{Result, TokenError};
pub use migrate::{MigrationOutcome, Migrator};
pub use selector::{BackendPreference, HostProbe, select_backend};
pub use source::{PersistentTokenSource, ProviderTokenSource, StaticTokenSource};
pub use storage::{StorageBackend, TokenBackend};
pub use store::TokenStore;
pub use token::Token;
