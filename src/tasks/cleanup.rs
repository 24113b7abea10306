//! Periodic Cleanup Task
//!
//! Background task that deletes expired entries of every configured key.
//! The engine never schedules this on its own; the embedding application
//! spawns it and aborts it on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::CacheEngine;

/// Spawns a task that runs [`CacheEngine::cleanup`] every `interval`.
///
/// Storage backends are synchronous, so each run happens on the blocking
/// thread pool. Failures on individual keys go to the engine's warning sink.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let engine = Arc::new(CacheEngine::new(config, Arc::new(InMemoryStorage::new())));
/// let cleanup_handle = spawn_cleanup_task(engine.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(engine: Arc<CacheEngine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting cache cleanup task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let run = Arc::clone(&engine);
            match tokio::task::spawn_blocking(move || run.cleanup()).await {
                Ok(0) => debug!("Cache cleanup: no expired entries found"),
                Ok(removed) => info!("Cache cleanup: removed {} expired entries", removed),
                Err(err) => warn!("Cache cleanup run did not complete: {}", err),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, KeyConfig};
    use crate::expiry::ManualClock;
    use crate::storage::InMemoryStorage;

    fn engine(clock: Arc<ManualClock>) -> Arc<CacheEngine> {
        let config = Config::new()
            .with_key("short", KeyConfig::with_ttl(5))
            .with_key("long", KeyConfig::with_ttl(3600));
        Arc::new(CacheEngine::new(config, Arc::new(InMemoryStorage::new())).with_clock(clock))
    }

    fn fill(engine: &CacheEngine, key: &str) {
        engine
            .cache(key, |_, _: &()| Ok::<_, anyhow::Error>(1u8), false, &())
            .unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let clock = Arc::new(ManualClock::default());
        let engine = engine(clock.clone());
        fill(&engine, "short");
        fill(&engine, "long");
        clock.advance(60);

        let handle = spawn_cleanup_task(engine.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(engine.entry_count().unwrap(), 1, "only the long-lived entry remains");
        assert_eq!(engine.expired_entry_count().unwrap(), 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let clock = Arc::new(ManualClock::default());
        let engine = engine(clock.clone());
        fill(&engine, "short");
        fill(&engine, "long");

        let handle = spawn_cleanup_task(engine.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.entry_count().unwrap(), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let engine = engine(Arc::new(ManualClock::default()));

        let handle = spawn_cleanup_task(engine, Duration::from_secs(1));

        // Abort immediately
        handle.abort();

        // Wait a bit and verify task is finished
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
