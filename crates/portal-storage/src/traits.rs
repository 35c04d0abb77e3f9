//! Storage trait definitions.

use crate::StorageResult;

/// Trait for key-value storage backends
pub trait KeyValueStorage: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Delete several keys in one backend operation.
    ///
    /// Backends that can batch (the file backend writes once) should
    /// override this so a session teardown is a single atomic write.
    fn delete_many(&self, keys: &[&str]) -> StorageResult<()> {
        for key in keys {
            let _ = self.delete(key)?;
        }
        Ok(())
    }
}
