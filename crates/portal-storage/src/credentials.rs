//! High-level API for the persisted session state.

use crate::{KeyValueStorage, StorageError, StorageKeys, StorageResult};
use std::collections::HashMap;

/// High-level facade over a storage backend for the three groups of
/// state the client persists: access token, refresh token, and UI
/// preferences.
///
/// Only the session layer writes tokens through this type; nothing else
/// in the workspace holds a second copy.
pub struct CredentialStore {
    storage: Box<dyn KeyValueStorage>,
}

impl CredentialStore {
    /// Create a new credential store with the given storage backend
    pub fn new(storage: Box<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    // ==========================================
    // Tokens
    // ==========================================

    /// Store the access token
    pub fn set_access_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::ACCESS_TOKEN, token)
    }

    /// Retrieve the access token
    pub fn get_access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ACCESS_TOKEN)
    }

    /// Store the refresh token
    pub fn set_refresh_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::REFRESH_TOKEN, token)
    }

    /// Retrieve the refresh token
    pub fn get_refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::REFRESH_TOKEN)
    }

    /// Delete only the refresh token, keeping the access token.
    ///
    /// Used by the "don't remember me" login path.
    pub fn delete_refresh_token(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::REFRESH_TOKEN)
    }

    /// Check whether any token material is stored
    pub fn has_tokens(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::ACCESS_TOKEN)
    }

    // ==========================================
    // UI preferences
    // ==========================================

    /// Store a single UI preference
    pub fn set_preference(&self, name: &str, value: &str) -> StorageResult<()> {
        let mut prefs = self.get_preferences()?;
        prefs.insert(name.to_string(), value.to_string());
        let json =
            serde_json::to_string(&prefs).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(StorageKeys::UI_PREFERENCES, &json)
    }

    /// Retrieve a single UI preference
    pub fn get_preference(&self, name: &str) -> StorageResult<Option<String>> {
        Ok(self.get_preferences()?.remove(name))
    }

    /// Retrieve the full preference map
    pub fn get_preferences(&self) -> StorageResult<HashMap<String, String>> {
        match self.storage.get(StorageKeys::UI_PREFERENCES)? {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| StorageError::Encoding(e.to_string()))
            }
            None => Ok(HashMap::new()),
        }
    }

    // ==========================================
    // Teardown
    // ==========================================

    /// Clear everything persisted for the session in one backend write.
    pub fn clear_session(&self) -> StorageResult<()> {
        self.storage.delete_many(&[
            StorageKeys::ACCESS_TOKEN,
            StorageKeys::REFRESH_TOKEN,
            StorageKeys::UI_PREFERENCES,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;

    fn store() -> CredentialStore {
        CredentialStore::new(Box::new(MemoryStorage::new()))
    }

    #[test]
    fn test_token_roundtrip() {
        let store = store();

        assert!(!store.has_tokens().unwrap());

        store.set_access_token("access-1").unwrap();
        store.set_refresh_token("refresh-1").unwrap();

        assert!(store.has_tokens().unwrap());
        assert_eq!(
            store.get_access_token().unwrap(),
            Some("access-1".to_string())
        );
        assert_eq!(
            store.get_refresh_token().unwrap(),
            Some("refresh-1".to_string())
        );
    }

    #[test]
    fn test_delete_refresh_token_keeps_access_token() {
        let store = store();
        store.set_access_token("access-1").unwrap();
        store.set_refresh_token("refresh-1").unwrap();

        assert!(store.delete_refresh_token().unwrap());

        assert_eq!(store.get_refresh_token().unwrap(), None);
        assert_eq!(
            store.get_access_token().unwrap(),
            Some("access-1".to_string())
        );
    }

    #[test]
    fn test_preferences() {
        let store = store();

        assert_eq!(store.get_preference("theme").unwrap(), None);

        store.set_preference("theme", "dark").unwrap();
        store.set_preference("sidebar", "collapsed").unwrap();

        assert_eq!(
            store.get_preference("theme").unwrap(),
            Some("dark".to_string())
        );
        assert_eq!(store.get_preferences().unwrap().len(), 2);
    }

    #[test]
    fn test_clear_session_removes_everything() {
        let store = store();
        store.set_access_token("access-1").unwrap();
        store.set_refresh_token("refresh-1").unwrap();
        store.set_preference("theme", "dark").unwrap();

        store.clear_session().unwrap();

        assert!(!store.has_tokens().unwrap());
        assert_eq!(store.get_refresh_token().unwrap(), None);
        assert!(store.get_preferences().unwrap().is_empty());
    }

    #[test]
    fn test_clear_session_idempotent() {
        let store = store();
        store.clear_session().unwrap();
        store.clear_session().unwrap();
        assert!(!store.has_tokens().unwrap());
    }
}
