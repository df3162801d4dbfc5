use std::sync::Arc;

use crate::error::Error;
use crate::storage::KeyValueStore;

/// Storage key of the persisted bearer token.
pub const TOKEN_KEY: &str = "userToken";

/// Persists the opaque session token across restarts.
///
/// Reads never fail: an unavailable medium or a missing value both mean
/// "logged out".
pub struct TokenStore<S> {
    storage: Arc<S>,
}

// Manual Clone: avoid derive adding an `S: Clone` bound.
impl<S> Clone for TokenStore<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
        }
    }
}

impl<S: KeyValueStore> TokenStore<S> {
    #[must_use]
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Returns the persisted token, or `""` when there is none.
    pub async fn get(&self) -> String {
        match self.storage.get(TOKEN_KEY).await {
            Ok(Some(token)) => token.trim().to_owned(),
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Token storage unavailable, treating as logged out");
                String::new()
            }
        }
    }

    /// Overwrites the persisted token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the medium rejected the write.
    pub async fn set(&self, token: &str) -> Result<(), Error> {
        self.storage.set(TOKEN_KEY, token).await
    }

    /// Removes the persisted token. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the medium rejected the delete.
    pub async fn clear(&self) -> Result<(), Error> {
        self.storage.remove(TOKEN_KEY).await
    }
}
