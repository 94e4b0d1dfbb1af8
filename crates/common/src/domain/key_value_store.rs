use crate::domain::result::DomainResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Idempotent string key/value store backing a materialized view.
///
/// Re-applying an upsert or delete leaves the store unchanged.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn upsert(&self, key: &str, value: &str) -> DomainResult<()>;

    /// Remove a key, returning the value it held
    async fn delete(&self, key: &str) -> DomainResult<Option<String>>;

    async fn lookup(&self, key: &str) -> DomainResult<Option<String>>;

    async fn count(&self) -> DomainResult<usize>;
}

/// In-memory implementation of KeyValueStore using HashMap
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn upsert(&self, key: &str, value: &str) -> DomainResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> DomainResult<Option<String>> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key))
    }

    async fn lookup(&self, key: &str) -> DomainResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn count(&self) -> DomainResult<usize> {
        let entries = self.entries.read().await;
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryKeyValueStore::new();

        store.upsert("app-1", "ch-1").await.unwrap();
        store.upsert("app-1", "ch-1").await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.lookup("app-1").await.unwrap().as_deref(), Some("ch-1"));
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_noop() {
        let store = InMemoryKeyValueStore::new();
        store.upsert("app-1", "ch-1").await.unwrap();

        assert_eq!(store.delete("app-1").await.unwrap().as_deref(), Some("ch-1"));
        assert_eq!(store.delete("app-1").await.unwrap(), None);
        assert_eq!(store.lookup("app-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_readers_during_writes() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        store.upsert("app-1", "ch-1").await.unwrap();

        let mut readers = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..100 {
                    assert_eq!(store.lookup("app-1").await.unwrap().as_deref(), Some("ch-1"));
                }
            }));
        }
        for i in 0..100 {
            store.upsert(&format!("app-{}", i + 2), "ch-x").await.unwrap();
        }
        for reader in readers {
            reader.await.unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 101);
    }
}
