use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::engine::Engine;

pub const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// One compactor check. Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            error!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::model::*;
    use crate::payments::InMemoryPayments;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("salonbook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn engine(path: PathBuf) -> Engine {
        Engine::new(
            path,
            Arc::new(InMemoryCatalog::new()),
            Arc::new(InMemoryPayments::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn below_threshold_skips() {
        let engine = engine(test_wal_path("below.wal"));
        engine.try_admit(1, Span::new(0, 1000)).await.unwrap();
        assert!(!compact_if_due(&engine, 10).await);
        assert_eq!(engine.wal_appends_since_compact().await, 1);
    }

    #[tokio::test]
    async fn threshold_reached_compacts_and_resets() {
        let engine = engine(test_wal_path("reached.wal"));
        for i in 0..5 {
            let h = engine.try_admit(1, Span::new(i * 1000, i * 1000 + 500)).await.unwrap();
            engine.release(h).await.unwrap();
        }
        assert!(compact_if_due(&engine, 10).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }
}
