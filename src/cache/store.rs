use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

/// Backing store for serialized snapshots.
///
/// Implementations must tolerate concurrent callers; there is no cross-key atomicity.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Live value for `key`, or `None` if missing or expired.
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration);
    /// Returns true if a value was removed.
    async fn delete(&self, key: &str) -> bool;
    async fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> usize;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process store. Expired entries are hidden on read and reclaimed by
/// [`CacheStore::purge_expired`].
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries.insert(
            key.to_owned(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect()
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryStore::new();
        store.set("appointment:x:-", "{}".into(), Duration::from_secs(60)).await;
        assert_eq!(store.get("appointment:x:-").await.as_deref(), Some("{}"));
        assert!(store.delete("appointment:x:-").await);
        assert!(!store.delete("appointment:x:-").await);
        assert!(store.get("appointment:x:-").await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_hidden_then_purged() {
        let store = MemoryStore::new();
        store.set("stale", "1".into(), Duration::ZERO).await;
        store.set("fresh", "2".into(), Duration::from_secs(60)).await;

        assert!(store.get("stale").await.is_none());
        assert_eq!(store.len(), 2);

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("fresh").await.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn prefix_scan() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set("counselor_slots:a:1", "x".into(), ttl).await;
        store.set("counselor_slots:a:2", "x".into(), ttl).await;
        store.set("counselor_slots:b:1", "x".into(), ttl).await;
        store.set("counselor:a:-", "x".into(), ttl).await;

        let mut keys = store.keys_with_prefix("counselor_slots:a:").await;
        keys.sort();
        assert_eq!(keys, vec!["counselor_slots:a:1", "counselor_slots:a:2"]);
        assert_eq!(store.keys_with_prefix("counselor:").await, vec!["counselor:a:-"]);
    }
}
