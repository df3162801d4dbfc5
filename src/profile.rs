use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::Error;
use crate::storage::KeyValueStore;

/// Storage key of the cached user object.
pub const PROFILE_KEY: &str = "userInfo";

/// Last-known user object as returned by the backend.
///
/// Advisory only: any field may be stale until reconciled with the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct CachedProfile {
    pub profile: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub cached_at: OffsetDateTime,
}

impl CachedProfile {
    /// First non-empty username-like field of the cached object.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        ["username", "userName"]
            .iter()
            .filter_map(|k| self.profile.get(*k).and_then(Value::as_str))
            .find(|s| !s.is_empty())
    }
}

pub struct ProfileCache<S> {
    storage: Arc<S>,
}

impl<S> Clone for ProfileCache<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
        }
    }
}

impl<S: KeyValueStore> ProfileCache<S> {
    #[must_use]
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Cache `profile`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the write fails.
    pub async fn save(&self, profile: &Value) -> Result<(), Error> {
        let record = CachedProfile {
            profile: profile.clone(),
            cached_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&record)?;
        self.storage.set(PROFILE_KEY, &json).await
    }

    /// Load the cached profile. Missing, unreadable and malformed records all
    /// yield `None`.
    pub async fn load(&self) -> Option<CachedProfile> {
        let raw = match self.storage.get(PROFILE_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "Profile cache unavailable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed cached profile");
                None
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the delete fails.
    pub async fn remove(&self) -> Result<(), Error> {
        self.storage.remove(PROFILE_KEY).await
    }
}
