//! Storage key constants.

/// Storage keys used by the portal client
pub struct StorageKeys;

impl StorageKeys {
    /// Access token (short-lived bearer credential)
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Refresh token (long-lived, exchanged for access tokens)
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// UI preferences (JSON object)
    pub const UI_PREFERENCES: &'static str = "ui_preferences";
}
