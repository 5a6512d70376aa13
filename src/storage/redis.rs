//! Redis repository: latest-price hash plus signal stream and pub/sub.
//!
//! Latest prices live in one hash (`<prefix>:latest`, field `EX:COIN`, JSON
//! value) with a TTL refreshed on every write. Signals go to a stream via
//! XADD and to a pub/sub channel for live consumers. Snapshots are not
//! stored in this backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::json;
use tracing::info;

use crate::config::RedisConfig;

use super::Repository;

pub struct RedisRepository {
    conn: ConnectionManager,
    key_latest: String,
    ttl_seconds: i64,
    signal_stream: String,
    signal_channel: String,
}

impl RedisRepository {
    pub async fn connect(cfg: &RedisConfig) -> Result<Self> {
        let url = connection_url(&cfg.addr, &cfg.password, cfg.db);
        let client = redis::Client::open(url).context("redis url")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("redis connect")?;

        info!(addr = %cfg.addr, "redis repo enabled");
        Ok(Self {
            conn,
            key_latest: format!("{}:latest", cfg.prefix),
            ttl_seconds: cfg.ttl_seconds,
            signal_stream: cfg.signal_stream.clone(),
            signal_channel: cfg.signal_channel.clone(),
        })
    }
}

fn connection_url(addr: &str, password: &str, db: i64) -> String {
    if password.is_empty() {
        format!("redis://{addr}/{db}")
    } else {
        format!("redis://:{password}@{addr}/{db}")
    }
}

#[async_trait]
impl Repository for RedisRepository {
    async fn upsert_latest_price(
        &self,
        exchange: &str,
        coin: &str,
        price: f64,
        ts_ms: i64,
    ) -> Result<()> {
        if price <= 0.0 {
            return Ok(());
        }

        let field = format!("{exchange}:{coin}");
        let value = json!({
            "exchange": exchange,
            "symbol": coin,
            "price": price,
            "ts": ts_ms,
        })
        .to_string();

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.hset(&self.key_latest, &field, value).ignore();
        if self.ttl_seconds > 0 {
            pipe.expire(&self.key_latest, self.ttl_seconds).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .context("redis upsert latest price")?;
        Ok(())
    }

    async fn insert_snapshot(&self, _ts_ms: i64, _payload: &str) -> Result<()> {
        Ok(())
    }

    async fn insert_signal(&self, ts_ms: i64, coin: &str, delta: f64, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();

        redis::cmd("XADD")
            .arg(&self.signal_stream)
            .arg("*")
            .arg("ts_ms")
            .arg(ts_ms)
            .arg("symbol")
            .arg(coin)
            .arg("delta")
            .arg(delta)
            .arg("payload")
            .arg(payload)
            .query_async::<_, String>(&mut conn)
            .await
            .context("redis xadd signal")?;

        let msg = json!({
            "ts_ms": ts_ms,
            "symbol": coin,
            "delta": delta,
            "payload": payload,
        })
        .to_string();
        conn.publish::<_, _, ()>(&self.signal_channel, msg)
            .await
            .context("redis publish signal")?;
        Ok(())
    }
}
