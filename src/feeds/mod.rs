//! Exchange price feeds and the fan-in merger.
//!
//! Each feed owns its WebSocket connection and an outbound bounded channel;
//! the merger forwards every feed into one stream for the monitor loop.
//! Ordering is preserved within a feed, not across feeds.

pub mod binance;
pub mod bitget;
pub mod bybit;
pub mod okx;
mod ws;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::models::Tick;

/// Bounded buffer for feed and fan-in channels. Producers block when the
/// consumer stalls; ticks are never dropped.
pub const TICK_BUFFER: usize = 1024;

/// A live source of ticks for one exchange.
///
/// `subscribe` validates inputs, spawns the connection task, and returns its
/// outbound channel. The channel closes only when `shutdown` flips; transient
/// connection errors reconnect internally.
pub trait PriceFeed: Send + Sync {
    fn name(&self) -> &'static str;
    fn subscribe(
        &self,
        shutdown: watch::Receiver<bool>,
        coins: &[String],
    ) -> Result<mpsc::Receiver<Tick>>;
}

/// Subscribe every feed and merge their outputs into one channel.
pub fn merge_feeds(
    feeds: &[Box<dyn PriceFeed>],
    shutdown: &watch::Receiver<bool>,
    coins: &[String],
) -> Result<mpsc::Receiver<Tick>> {
    let mut receivers = Vec::with_capacity(feeds.len());
    for feed in feeds {
        receivers.push(feed.subscribe(shutdown.clone(), coins)?);
        info!(feed = feed.name(), "feed started");
    }
    Ok(merge(receivers, shutdown.clone()))
}

/// Fan-in: one forwarder task per input, all feeding a shared bounded
/// channel. A forwarder exits when its input closes or shutdown flips.
pub fn merge(
    receivers: Vec<mpsc::Receiver<Tick>>,
    shutdown: watch::Receiver<bool>,
) -> mpsc::Receiver<Tick> {
    let (tx, rx) = mpsc::channel(TICK_BUFFER);
    for mut input in receivers {
        let tx = tx.clone();
        let mut shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    tick = input.recv() => {
                        let Some(tick) = tick else { return };
                        if tx.send(tick).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }
    rx
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(ex: &str, n: i64) -> Tick {
        Tick {
            exchange: ex.to_string(),
            coin: "BTC".to_string(),
            price_str: n.to_string(),
            price_num: Some(n as f64),
            ts_ms: n,
        }
    }

    #[tokio::test]
    async fn merge_preserves_per_feed_order() {
        let (tx_a, rx_a) = mpsc::channel(TICK_BUFFER);
        let (tx_b, rx_b) = mpsc::channel(TICK_BUFFER);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut merged = merge(vec![rx_a, rx_b], shutdown_rx);

        for n in 0..5 {
            tx_a.send(tick("EX1", n)).await.unwrap();
            tx_b.send(tick("EX2", n)).await.unwrap();
        }
        drop(tx_a);
        drop(tx_b);

        let mut seen_a = Vec::new();
        let mut seen_b = Vec::new();
        while let Some(t) = merged.recv().await {
            match t.exchange.as_str() {
                "EX1" => seen_a.push(t.ts_ms),
                _ => seen_b.push(t.ts_ms),
            }
        }
        assert_eq!(seen_a, vec![0, 1, 2, 3, 4]);
        assert_eq!(seen_b, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn merged_channel_closes_after_inputs_close() {
        let (tx, rx) = mpsc::channel(TICK_BUFFER);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut merged = merge(vec![rx], shutdown_rx);

        tx.send(tick("EX1", 1)).await.unwrap();
        drop(tx);

        assert!(merged.recv().await.is_some());
        assert!(merged.recv().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_stops_forwarders() {
        let (tx, rx) = mpsc::channel(TICK_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut merged = merge(vec![rx], shutdown_rx);

        shutdown_tx.send(true).unwrap();
        // keep the producer side alive; the forwarder must still exit
        let _tx = tx;
        assert!(merged.recv().await.is_none());
    }
}
