//! Storage key constants.

/// Storage keys used for the persisted session
pub struct StorageKeys;

impl StorageKeys {
    /// Short-lived access token
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Normalized role of the signed-in user
    pub const ROLE: &'static str = "role";
}
