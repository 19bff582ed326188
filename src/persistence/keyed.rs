//! Keyed blob codec
//!
//! Logs are persisted as a JSON array of `[key, value]` pairs and rewritten
//! whole on every change. Read-modify-write cycles on the same blob are
//! serialized within the process.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::ObjectStore;
use crate::error::{Result, SwapdError};

pub fn decode<K, V>(bytes: &[u8]) -> Result<BTreeMap<K, V>>
where
    K: DeserializeOwned + Ord,
    V: DeserializeOwned,
{
    let pairs: Vec<(K, V)> = serde_json::from_slice(bytes)?;
    Ok(pairs.into_iter().collect())
}

pub fn encode<K, V>(map: &BTreeMap<K, V>) -> Result<Vec<u8>>
where
    K: Serialize,
    V: Serialize,
{
    let pairs: Vec<(&K, &V)> = map.iter().collect();
    Ok(serde_json::to_vec(&pairs)?)
}

/// Key-ordered maps stored as blobs in an [`ObjectStore`]
pub struct KeyedBlobStore {
    store: Arc<dyn ObjectStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedBlobStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    /// Load a blob; a blob that does not exist yet is an empty map.
    pub async fn load<K, V>(&self, blob: &str) -> Result<BTreeMap<K, V>>
    where
        K: DeserializeOwned + Ord,
        V: DeserializeOwned,
    {
        match self.store.get(blob).await? {
            Some(bytes) => decode(&bytes)
                .map_err(|e| SwapdError::Storage(format!("corrupt blob {}: {}", blob, e))),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Load, apply `change`, and persist when it reports `(result, true)`.
    ///
    /// Nothing is applied unless the write succeeds: on a failed put the
    /// modified map is dropped and the error returned.
    pub async fn update<K, V, R, F>(&self, blob: &str, change: F) -> Result<R>
    where
        K: Serialize + DeserializeOwned + Ord,
        V: Serialize + DeserializeOwned,
        F: FnOnce(&mut BTreeMap<K, V>) -> (R, bool),
    {
        let lock = self.lock_for(blob);
        let _held = lock.lock().await;

        let mut map = self.load(blob).await?;
        let (result, changed) = change(&mut map);
        if changed {
            self.store.put(blob, encode(&map)?).await?;
        }
        Ok(result)
    }

    fn lock_for(&self, blob: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(blob.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryObjectStore, MockObjectStore};

    #[test]
    fn blob_is_an_array_of_pairs() {
        let mut map = BTreeMap::new();
        map.insert(200_i64, "b".to_string());
        map.insert(100_i64, "a".to_string());
        let bytes = encode(&map).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"[[100,"a"],[200,"b"]]"#);
        assert_eq!(decode::<i64, String>(&bytes).unwrap(), map);
    }

    #[tokio::test]
    async fn missing_blob_loads_empty() {
        let blobs = KeyedBlobStore::new(Arc::new(MemoryObjectStore::new()));
        let map: BTreeMap<i64, f64> = blobs.load("nothing.json").await.unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn unchanged_update_does_not_write() {
        let mut store = MockObjectStore::new();
        store.expect_get().returning(|_| Ok(None));
        store.expect_put().never();

        let blobs = KeyedBlobStore::new(Arc::new(store));
        let len = blobs
            .update::<i64, f64, _, _>("x.json", |map| (map.len(), false))
            .await
            .unwrap();
        assert_eq!(len, 0);
    }

    #[tokio::test]
    async fn corrupt_blob_is_a_storage_error() {
        let store = Arc::new(MemoryObjectStore::new());
        store.put("bad.json", b"{not json".to_vec()).await.unwrap();
        let blobs = KeyedBlobStore::new(store);
        let err = blobs.load::<i64, f64>("bad.json").await.unwrap_err();
        assert!(matches!(err, SwapdError::Storage(_)));
    }
}
