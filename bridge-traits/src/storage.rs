//! Secure credential storage.

use async_trait::async_trait;

use crate::error::Result;

/// Secure credential storage trait
///
/// Holds the scrobble service session key between runs. Desktop uses the OS
/// keychain; tests can use an in-memory map.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn remember(store: &dyn SecureStore, session_key: &str) -> Result<()> {
///     store.set_secret("lastfm.session_key", session_key.as_bytes()).await
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, replacing any previous one
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// Returns `Ok(None)` if the key doesn't exist. Returned data must not be
    /// logged.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing key is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check if a secret exists without retrieving it
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }
}
