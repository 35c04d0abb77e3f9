//! Local persistence for the portal client.
//!
//! This crate provides the storage abstraction the session layer writes
//! tokens through:
//! - `KeyValueStorage` trait with pluggable backends
//! - `MemoryStorage` (non-persistent, used by tests and ephemeral sessions)
//! - `FileStorage` (JSON file under the user config directory)
//! - `CredentialStore` high-level facade for tokens and UI preferences

mod credentials;
mod file;
mod keys;
mod memory;
mod traits;

pub use credentials::CredentialStore;
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::KeyValueStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Application directory name under the user config dir.
pub const APP_DIR: &str = "portal";

/// Create the default persistent storage backend.
pub fn create_storage() -> StorageResult<Box<dyn KeyValueStorage>> {
    let base = dirs::config_dir()
        .ok_or_else(|| StorageError::Backend("No config directory on this platform".to_string()))?;
    let storage = FileStorage::new(base.join(APP_DIR).join("credentials.json"))?;
    Ok(Box::new(storage))
}

/// Create a CredentialStore backed by the default persistent storage.
pub fn create_credential_store() -> StorageResult<CredentialStore> {
    let storage = create_storage()?;
    Ok(CredentialStore::new(storage))
}
