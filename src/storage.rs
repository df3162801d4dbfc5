//! Durable key-value media backing the token and profile records.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Error;

/// Application-local key-value storage.
///
/// Values are opaque strings. Implementations must make a completed `set`
/// visible to every later `get`, including after a process restart for
/// durable media.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, Error>> + Send;

    /// Write a value, overwriting any previous one.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Delete a value. Deleting an absent key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One file per key under a directory.
///
/// Writes land in a temporary sibling that is synced and renamed over the
/// target, so readers see either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under `<platform data dir>/attendify`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the platform has no local data directory.
    pub fn in_data_dir() -> Result<Self, Error> {
        let base = dirs::data_local_dir()
            .ok_or_else(|| Error::Storage("no local data directory on this platform".into()))?;
        Ok(Self::new(base.join("attendify")))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, Error> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(Error::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(key))
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("read {}: {e}", path.display()))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        use tokio::io::AsyncWriteExt;

        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Storage(format!("create {}: {e}", self.dir.display())))?;

        // Unique per write so concurrent writers never share a temp file.
        let tmp = self
            .dir
            .join(format!(".{key}.{:016x}.tmp", rand::random::<u64>()));
        let write = async {
            let mut file = tokio::fs::File::create_new(&tmp).await?;
            file.write_all(value.as_bytes()).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &path).await
        };
        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::Storage(format!("write {}: {e}", path.display())));
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("remove {}: {e}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let store = FileStore::new("/tmp/unused");
        assert!(store.path_for("../etc/passwd").is_err());
        assert!(store.path_for("a/b").is_err());
        assert!(store.path_for("").is_err());
        assert!(store.path_for("userToken").is_ok());
    }
}
