//! Read-through cache for query results.
//!
//! Values are stored as JSON snapshots in a [`CacheStore`]. Writers call
//! [`ReadThroughCache::invalidate_change`] after committing, before they reply,
//! so a reader that follows a write never sees the pre-write snapshot.

mod keys;
mod registry;
mod store;

pub use keys::{filter_params, hash_params, note_filter_params, window_params, CacheKey, InvalidationScope, Scope};
pub use registry::EntityChange;
pub use store::{CacheStore, MemoryStore};

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::observability::{CACHE_HITS_TOTAL, CACHE_INVALIDATED_KEYS_TOTAL, CACHE_MISSES_TOTAL};

#[derive(Clone)]
pub struct ReadThroughCache {
    store: Arc<dyn CacheStore>,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Return the cached value under `key`, or run `compute` and cache its result.
    ///
    /// Errors from `compute` pass through uncached. Concurrent misses on the
    /// same key each run `compute`; the last writer wins.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let rendered = key.to_string();
        let scope = key.scope.as_str();

        if let Some(raw) = self.store.get(&rendered).await {
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    metrics::counter!(CACHE_HITS_TOTAL, "scope" => scope).increment(1);
                    tracing::debug!(key = %rendered, "cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(key = %rendered, "dropping undecodable cache entry: {e}");
                    self.store.delete(&rendered).await;
                }
            }
        }

        metrics::counter!(CACHE_MISSES_TOTAL, "scope" => scope).increment(1);
        tracing::debug!(key = %rendered, "cache miss");
        let value = compute().await?;
        match serde_json::to_string(&value) {
            Ok(raw) => self.store.set(&rendered, raw, key.scope.ttl()).await,
            Err(e) => tracing::warn!(key = %rendered, "not caching unserializable value: {e}"),
        }
        Ok(value)
    }

    /// Delete every key under each scope. Returns how many keys were removed.
    pub async fn invalidate(&self, scopes: &[InvalidationScope]) -> usize {
        let mut removed = 0;
        for scope in scopes {
            let prefix = scope.prefix();
            for key in self.store.keys_with_prefix(&prefix).await {
                if self.store.delete(&key).await {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            metrics::counter!(CACHE_INVALIDATED_KEYS_TOTAL).increment(removed as u64);
        }
        removed
    }

    pub async fn invalidate_change(&self, change: &EntityChange) -> usize {
        let removed = self.invalidate(&change.scopes()).await;
        tracing::debug!(?change, removed, "cache invalidated");
        removed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use ulid::Ulid;

    use super::*;

    fn cache() -> (ReadThroughCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ReadThroughCache::new(store.clone()), store)
    }

    #[tokio::test]
    async fn second_read_served_from_cache() {
        let (cache, _) = cache();
        let calls = AtomicUsize::new(0);
        let key = CacheKey::global(Scope::Counselors);

        for _ in 0..3 {
            let v: Result<Vec<u32>, String> = cache
                .get_or_compute(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await;
            assert_eq!(v.unwrap(), vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let (cache, store) = cache();
        let key = CacheKey::entity(Scope::Appointment, Ulid::new());

        let first: Result<u32, &str> = cache.get_or_compute(&key, || async { Err("not found") }).await;
        assert_eq!(first, Err("not found"));
        assert!(store.is_empty());

        let second: Result<u32, &str> = cache.get_or_compute(&key, || async { Ok(7) }).await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn corrupt_snapshot_recomputed() {
        let (cache, store) = cache();
        let key = CacheKey::global(Scope::Analytics);
        store
            .set(&key.to_string(), "not json".into(), Duration::from_secs(60))
            .await;

        let v: Result<u32, ()> = cache.get_or_compute(&key, || async { Ok(42) }).await;
        assert_eq!(v, Ok(42));
        assert_eq!(store.get(&key.to_string()).await.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn appointment_change_clears_dependent_reads_only() {
        let (cache, store) = cache();
        let (id, student, counselor) = (Ulid::new(), Ulid::new(), Ulid::new());
        let other_student = Ulid::new();

        let keys = [
            CacheKey::entity(Scope::Appointment, id),
            CacheKey::entity(Scope::StudentAppointments, student).with_params("status="),
            CacheKey::entity(Scope::CounselorSlots, counselor).with_params("start=1&end=2"),
            CacheKey::global(Scope::AdminAppointments).with_params("limit=100"),
        ];
        for key in &keys {
            let _: Result<u8, ()> = cache.get_or_compute(key, || async { Ok(1) }).await;
        }
        let survivor = CacheKey::entity(Scope::StudentAppointments, other_student);
        let directory = CacheKey::global(Scope::Counselors);
        for key in [&survivor, &directory] {
            let _: Result<u8, ()> = cache.get_or_compute(key, || async { Ok(1) }).await;
        }

        let removed = cache
            .invalidate_change(&EntityChange::Appointment {
                id,
                student_id: student,
                counselor_id: counselor,
            })
            .await;
        assert_eq!(removed, keys.len());
        for key in &keys {
            assert!(store.get(&key.to_string()).await.is_none(), "{key} survived");
        }
        assert!(store.get(&survivor.to_string()).await.is_some());
        assert!(store.get(&directory.to_string()).await.is_some());
    }

    #[tokio::test]
    async fn read_after_invalidation_sees_new_value() {
        let (cache, _) = cache();
        let counselor = Ulid::new();
        let key = CacheKey::entity(Scope::Counselor, counselor);

        let before: Result<String, ()> = cache.get_or_compute(&key, || async { Ok("Reyes".into()) }).await;
        assert_eq!(before.unwrap(), "Reyes");

        cache.invalidate_change(&EntityChange::Counselor { id: counselor }).await;

        let after: Result<String, ()> = cache
            .get_or_compute(&key, || async { Ok("Reyes-Ortiz".into()) })
            .await;
        assert_eq!(after.unwrap(), "Reyes-Ortiz");
    }
}
