use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::CacheStore;
use crate::engine::Engine;
use crate::observability::{CACHE_EXPIRED_KEYS_TOTAL, WAL_COMPACTIONS_TOTAL};

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact once the WAL has grown by `threshold` appends. Returns whether it ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
            true
        }
        Err(e) => {
            tracing::error!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that keeps the WAL from growing without bound.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

/// Background task that reclaims expired cache entries.
pub async fn run_cache_sweeper(store: Arc<dyn CacheStore>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let removed = store.purge_expired().await;
        if removed > 0 {
            tracing::debug!("swept {removed} expired cache entries");
            metrics::counter!(CACHE_EXPIRED_KEYS_TOTAL).increment(removed as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::model::*;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("haven_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("compact_threshold.wal");
        let engine = Engine::new(path).unwrap();
        let counselor = Ulid::new();
        engine
            .create_counselor(
                counselor,
                CounselorProfile {
                    name: "Reyes".into(),
                    office: None,
                    phone: None,
                    departments: Vec::new(),
                },
            )
            .await
            .unwrap();

        assert!(!compact_if_needed(&engine, 5).await);
        assert_eq!(engine.wal_appends_since_compact().await, 1);

        let student = Actor::student(Ulid::new());
        let base = 1_767_225_600_000;
        for i in 0..4 {
            engine
                .book_appointment(&student, counselor, base + i * 3_600_000, base + (i + 1) * 3_600_000, None)
                .await
                .unwrap();
        }

        assert!(compact_if_needed(&engine, 5).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    #[tokio::test]
    async fn sweeper_purges_expired_entries() {
        let store = Arc::new(MemoryStore::new());
        store.set("stale", "1".into(), Duration::ZERO).await;
        store.set("fresh", "2".into(), Duration::from_secs(3600)).await;

        let task = tokio::spawn(run_cache_sweeper(store.clone(), Duration::from_secs(10)));
        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();

        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").await.is_some());
    }
}
