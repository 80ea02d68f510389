//! Asynchronous key-value store abstraction.
//!
//! Tracking state, the work site and the pending queue are small JSON blobs
//! stored under string keys. Writes that must happen together go through
//! [`Batch`], which is applied atomically and only if every expectation
//! still holds.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Set { key: String, value: String },
    Remove { key: String },
}

/// Guarded, atomic group of writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// `(key, expected)` pairs; `None` means the key must be absent.
    pub expect: Vec<(String, Option<String>)>,
    pub ops: Vec<KvOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(mut self, key: &str, value: Option<&str>) -> Self {
        self.expect.push((key.to_string(), value.map(str::to_string)));
        self
    }

    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.ops.push(KvOp::Set {
            key: key.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.ops.push(KvOp::Remove {
            key: key.to_string(),
        });
        self
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Apply every op in `batch` or none of them.
    ///
    /// Returns [`StoreError::Conflict`] when an expectation does not match
    /// the current value.
    async fn apply(&self, batch: Batch) -> Result<(), StoreError>;
}

/// Process-local store, used by tests and embedders without durable storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store poisoned".into()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries()?.remove(key);
        Ok(())
    }

    async fn apply(&self, batch: Batch) -> Result<(), StoreError> {
        let mut entries = self.entries()?;
        for (key, expected) in &batch.expect {
            if entries.get(key) != expected.as_ref() {
                return Err(StoreError::Conflict { key: key.clone() });
            }
        }
        for op in batch.ops {
            match op {
                KvOp::Set { key, value } => {
                    entries.insert(key, value);
                }
                KvOp::Remove { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_remove() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.remove("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_applies_all_ops() {
        let store = MemoryStore::new();
        store.set("gone", "x").await.unwrap();
        store
            .apply(Batch::new().set("a", "1").set("b", "2").remove("gone"))
            .await
            .unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
        assert!(store.get("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_expectation_applies_nothing() {
        let store = MemoryStore::new();
        store.set("state", "v2").await.unwrap();
        let err = store
            .apply(
                Batch::new()
                    .expect("state", Some("v1"))
                    .set("state", "v3")
                    .set("other", "x"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { key } if key == "state"));
        assert_eq!(store.get("state").await.unwrap().as_deref(), Some("v2"));
        assert!(store.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expect_absent() {
        let store = MemoryStore::new();
        store
            .apply(Batch::new().expect("k", None).set("k", "1"))
            .await
            .unwrap();
        assert!(store
            .apply(Batch::new().expect("k", None).set("k", "2"))
            .await
            .is_err());
    }
}
