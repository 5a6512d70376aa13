//! Embedded SQLite repository.
//!
//! WAL mode, one connection behind a mutex, upserts keyed on
//! (exchange, symbol) for latest prices, append-only snapshots and signals.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::info;

use super::Repository;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS prices (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  exchange TEXT NOT NULL,
  symbol TEXT NOT NULL,
  price REAL NOT NULL,
  ts_ms INTEGER NOT NULL,
  created_at INTEGER NOT NULL,
  UNIQUE(exchange, symbol)
);
CREATE INDEX IF NOT EXISTS idx_prices_ts ON prices(ts_ms);
CREATE INDEX IF NOT EXISTS idx_prices_symbol ON prices(symbol);

CREATE TABLE IF NOT EXISTS snapshots (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  payload TEXT NOT NULL,
  created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshots_ts ON snapshots(ts_ms);

CREATE TABLE IF NOT EXISTS signals (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  symbol TEXT NOT NULL,
  delta REAL NOT NULL,
  payload TEXT NOT NULL,
  created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_signals_ts ON signals(ts_ms);
CREATE INDEX IF NOT EXISTS idx_signals_symbol ON signals(symbol);
"#;

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(dir) = std::path::Path::new(path).parent() {
            if !dir.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(dir);
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .with_context(|| format!("open sqlite database at {path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("initialize sqlite schema")?;

        info!(path, "sqlite repo enabled");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests.
    #[cfg(test)]
    fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn upsert_latest_price(
        &self,
        exchange: &str,
        coin: &str,
        price: f64,
        ts_ms: i64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO prices(exchange, symbol, price, ts_ms, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(exchange, symbol) DO UPDATE SET
             price = excluded.price, ts_ms = excluded.ts_ms",
            params![exchange, coin, price, ts_ms, ts_ms],
        )
        .context("upsert latest price")?;
        Ok(())
    }

    async fn insert_snapshot(&self, ts_ms: i64, payload: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO snapshots(ts_ms, payload, created_at) VALUES(?1, ?2, ?3)",
            params![ts_ms, payload, ts_ms],
        )
        .context("insert snapshot")?;
        Ok(())
    }

    async fn insert_signal(&self, ts_ms: i64, coin: &str, delta: f64, payload: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO signals(ts_ms, symbol, delta, payload, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5)",
            params![ts_ms, coin, delta, payload, ts_ms],
        )
        .context("insert signal")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_keeps_one_row_per_exchange_symbol() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.upsert_latest_price("BINANCE", "BTC", 100.0, 1)
            .await
            .unwrap();
        repo.upsert_latest_price("BINANCE", "BTC", 101.0, 2)
            .await
            .unwrap();
        repo.upsert_latest_price("BYBIT", "BTC", 102.0, 3)
            .await
            .unwrap();

        let conn = repo.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM prices", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);

        let price: f64 = conn
            .query_row(
                "SELECT price FROM prices WHERE exchange = 'BINANCE' AND symbol = 'BTC'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(price, 101.0);
    }

    #[tokio::test]
    async fn signals_and_snapshots_append() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.insert_snapshot(1, "snap-1").await.unwrap();
        repo.insert_snapshot(2, "snap-2").await.unwrap();
        repo.insert_signal(3, "BTC", 6.5, "line").await.unwrap();

        let conn = repo.conn.lock();
        let snaps: i64 = conn
            .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))
            .unwrap();
        assert_eq!(snaps, 2);

        let (symbol, delta): (String, f64) = conn
            .query_row("SELECT symbol, delta FROM signals", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(symbol, "BTC");
        assert_eq!(delta, 6.5);
    }
}
