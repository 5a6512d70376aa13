//! Postgres repository over a sqlx connection pool.
//!
//! Same logical schema as the SQLite backend; the migration runs statement
//! by statement on connect.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use super::Repository;

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS prices (
       id BIGSERIAL PRIMARY KEY,
       exchange VARCHAR(50) NOT NULL,
       symbol VARCHAR(50) NOT NULL,
       price DOUBLE PRECISION NOT NULL,
       ts_ms BIGINT NOT NULL,
       created_at BIGINT NOT NULL,
       UNIQUE(exchange, symbol)
     )",
    "CREATE INDEX IF NOT EXISTS idx_prices_ts ON prices(ts_ms)",
    "CREATE INDEX IF NOT EXISTS idx_prices_symbol ON prices(symbol)",
    "CREATE TABLE IF NOT EXISTS snapshots (
       id BIGSERIAL PRIMARY KEY,
       ts_ms BIGINT NOT NULL,
       payload TEXT NOT NULL,
       created_at BIGINT NOT NULL
     )",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_ts ON snapshots(ts_ms)",
    "CREATE TABLE IF NOT EXISTS signals (
       id BIGSERIAL PRIMARY KEY,
       ts_ms BIGINT NOT NULL,
       symbol VARCHAR(50) NOT NULL,
       delta DOUBLE PRECISION NOT NULL,
       payload TEXT NOT NULL,
       created_at BIGINT NOT NULL
     )",
    "CREATE INDEX IF NOT EXISTS idx_signals_ts ON signals(ts_ms)",
    "CREATE INDEX IF NOT EXISTS idx_signals_symbol ON signals(symbol)",
];

pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .context("postgres connect")?;

        for stmt in MIGRATIONS {
            sqlx::query(stmt)
                .execute(&pool)
                .await
                .context("postgres migrate")?;
        }

        info!("postgres repo enabled");
        Ok(Self { pool })
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn upsert_latest_price(
        &self,
        exchange: &str,
        coin: &str,
        price: f64,
        ts_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO prices(exchange, symbol, price, ts_ms, created_at)
             VALUES($1, $2, $3, $4, $5)
             ON CONFLICT(exchange, symbol) DO UPDATE SET
             price = excluded.price, ts_ms = excluded.ts_ms",
        )
        .bind(exchange)
        .bind(coin)
        .bind(price)
        .bind(ts_ms)
        .bind(ts_ms)
        .execute(&self.pool)
        .await
        .context("postgres upsert latest price")?;
        Ok(())
    }

    async fn insert_snapshot(&self, ts_ms: i64, payload: &str) -> Result<()> {
        sqlx::query("INSERT INTO snapshots(ts_ms, payload, created_at) VALUES($1, $2, $3)")
            .bind(ts_ms)
            .bind(payload)
            .bind(ts_ms)
            .execute(&self.pool)
            .await
            .context("postgres insert snapshot")?;
        Ok(())
    }

    async fn insert_signal(&self, ts_ms: i64, coin: &str, delta: f64, payload: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO signals(ts_ms, symbol, delta, payload, created_at)
             VALUES($1, $2, $3, $4, $5)",
        )
        .bind(ts_ms)
        .bind(coin)
        .bind(delta)
        .bind(payload)
        .bind(ts_ms)
        .execute(&self.pool)
        .await
        .context("postgres insert signal")?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
