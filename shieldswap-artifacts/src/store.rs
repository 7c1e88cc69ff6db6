//! Key → blob storage behind the artifact cache.

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use sled::Db;

use crate::error::ArtifactError;

#[derive(Clone)]
pub struct ArtifactStore {
    backend: Arc<StoreBackend>,
}

enum StoreBackend {
    InMemory(Mutex<HashMap<String, Vec<u8>>>),
    Persistent(Db),
}

impl ArtifactStore {
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(StoreBackend::InMemory(Mutex::new(HashMap::new()))),
        }
    }

    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    ArtifactError::Storage(format!(
                        "failed to create directory for artifact db at {}: {}",
                        path_ref.display(),
                        err
                    ))
                })?;
            }
        }
        let db = sled::open(path_ref)?;
        Ok(Self {
            backend: Arc::new(StoreBackend::Persistent(db)),
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        match &*self.backend {
            StoreBackend::InMemory(map) => Ok(lock(map)?.get(key).cloned()),
            StoreBackend::Persistent(db) => Ok(db.get(key)?.map(|ivec| ivec.to_vec())),
        }
    }

    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        match &*self.backend {
            StoreBackend::InMemory(map) => {
                lock(map)?.insert(key.to_string(), bytes.to_vec());
                Ok(())
            }
            StoreBackend::Persistent(db) => {
                db.insert(key, bytes)?;
                db.flush()?;
                Ok(())
            }
        }
    }

    pub fn contains(&self, key: &str) -> Result<bool, ArtifactError> {
        match &*self.backend {
            StoreBackend::InMemory(map) => Ok(lock(map)?.contains_key(key)),
            StoreBackend::Persistent(db) => Ok(db.contains_key(key)?),
        }
    }

    pub fn remove(&self, key: &str) -> Result<(), ArtifactError> {
        match &*self.backend {
            StoreBackend::InMemory(map) => {
                lock(map)?.remove(key);
                Ok(())
            }
            StoreBackend::Persistent(db) => {
                db.remove(key)?;
                Ok(())
            }
        }
    }

    /// Drop every entry, including the schema marker.
    pub fn clear(&self) -> Result<(), ArtifactError> {
        match &*self.backend {
            StoreBackend::InMemory(map) => {
                lock(map)?.clear();
                Ok(())
            }
            StoreBackend::Persistent(db) => {
                db.clear()?;
                db.flush()?;
                Ok(())
            }
        }
    }

    pub fn len(&self) -> Result<usize, ArtifactError> {
        match &*self.backend {
            StoreBackend::InMemory(map) => Ok(lock(map)?.len()),
            StoreBackend::Persistent(db) => Ok(db.len()),
        }
    }

    pub fn is_empty(&self) -> Result<bool, ArtifactError> {
        self.len().map(|len| len == 0)
    }
}

fn lock(
    map: &Mutex<HashMap<String, Vec<u8>>>,
) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, ArtifactError> {
    map.lock()
        .map_err(|_| ArtifactError::Storage("artifact store poisoned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &ArtifactStore) {
        assert!(store.is_empty().unwrap());
        store.put("net/01x01/zkey", b"zkey-bytes").unwrap();
        assert!(store.contains("net/01x01/zkey").unwrap());
        assert_eq!(store.get("net/01x01/zkey").unwrap().unwrap(), b"zkey-bytes");
        assert_eq!(store.get("net/01x01/wasm").unwrap(), None);

        store.remove("net/01x01/zkey").unwrap();
        assert!(!store.contains("net/01x01/zkey").unwrap());

        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();
        assert_eq!(store.len().unwrap(), 2);
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn in_memory_store_round_trips() {
        exercise(&ArtifactStore::in_memory());
    }

    #[test]
    fn persistent_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("artifacts.db");
        let store = ArtifactStore::persistent(&path).unwrap();
        exercise(&store);
        assert!(path.exists());
    }
}
