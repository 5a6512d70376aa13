//! Write-only persistence of latest prices, snapshots, and signals.
//!
//! The monitor calls every repository fire-and-forget: errors are logged by
//! the caller and never propagated into the pipeline.

pub mod postgres;
pub mod redis;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Repository: Send + Sync {
    async fn upsert_latest_price(
        &self,
        exchange: &str,
        coin: &str,
        price: f64,
        ts_ms: i64,
    ) -> Result<()>;

    async fn insert_snapshot(&self, ts_ms: i64, payload: &str) -> Result<()>;

    async fn insert_signal(&self, ts_ms: i64, coin: &str, delta: f64, payload: &str) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Used when persistence is disabled; every write succeeds without effect.
pub struct NoopRepository;

#[async_trait]
impl Repository for NoopRepository {
    async fn upsert_latest_price(&self, _: &str, _: &str, _: f64, _: i64) -> Result<()> {
        Ok(())
    }

    async fn insert_snapshot(&self, _: i64, _: &str) -> Result<()> {
        Ok(())
    }

    async fn insert_signal(&self, _: i64, _: &str, _: f64, _: &str) -> Result<()> {
        Ok(())
    }
}

/// Fans every write out to all children. Each child is attempted even when
/// an earlier one fails; the first error is reported.
pub struct CompositeRepository {
    repos: Vec<Box<dyn Repository>>,
}

impl CompositeRepository {
    pub fn new(repos: Vec<Box<dyn Repository>>) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Repository for CompositeRepository {
    async fn upsert_latest_price(
        &self,
        exchange: &str,
        coin: &str,
        price: f64,
        ts_ms: i64,
    ) -> Result<()> {
        let mut first_err = None;
        for repo in &self.repos {
            if let Err(e) = repo.upsert_latest_price(exchange, coin, price, ts_ms).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn insert_snapshot(&self, ts_ms: i64, payload: &str) -> Result<()> {
        let mut first_err = None;
        for repo in &self.repos {
            if let Err(e) = repo.insert_snapshot(ts_ms, payload).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn insert_signal(&self, ts_ms: i64, coin: &str, delta: f64, payload: &str) -> Result<()> {
        let mut first_err = None;
        for repo in &self.repos {
            if let Err(e) = repo.insert_signal(ts_ms, coin, delta, payload).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn close(&self) -> Result<()> {
        let mut first_err = None;
        for repo in self.repos.iter().rev() {
            if let Err(e) = repo.close().await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingRepo {
        writes: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Repository for CountingRepo {
        async fn upsert_latest_price(&self, _: &str, _: &str, _: f64, _: i64) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("write failed"));
            }
            Ok(())
        }

        async fn insert_snapshot(&self, _: i64, _: &str) -> Result<()> {
            Ok(())
        }

        async fn insert_signal(&self, _: i64, _: &str, _: f64, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_child_does_not_stop_later_children() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let composite = CompositeRepository::new(vec![
            Box::new(CountingRepo {
                writes: first.clone(),
                fail: true,
            }),
            Box::new(CountingRepo {
                writes: second.clone(),
                fail: false,
            }),
        ]);

        let res = composite.upsert_latest_price("BINANCE", "BTC", 1.0, 0).await;
        assert!(res.is_err());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn noop_accepts_everything() {
        let repo = NoopRepository;
        assert!(repo.upsert_latest_price("X", "Y", 1.0, 0).await.is_ok());
        assert!(repo.insert_snapshot(0, "line").await.is_ok());
        assert!(repo.insert_signal(0, "BTC", 1.0, "line").await.is_ok());
    }
}
