//! Bybit v5 linear tickers feed.
//!
//! The `data` field arrives as a single object on snapshot frames and as an
//! array on some delta frames; both shapes are accepted.

use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use crate::feeds::{now_ms, PriceFeed, TICK_BUFFER};
use crate::models::Tick;
use crate::symbol::SymbolConverter;

pub const EXCHANGE: &str = "BYBIT";

pub struct BybitFeed {
    ws_url: String,
    converter: SymbolConverter,
}

impl BybitFeed {
    pub fn new(ws_url: &str, converter: SymbolConverter) -> Self {
        Self {
            ws_url: ws_url.trim().to_string(),
            converter,
        }
    }
}

impl PriceFeed for BybitFeed {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    fn subscribe(
        &self,
        shutdown: watch::Receiver<bool>,
        coins: &[String],
    ) -> Result<mpsc::Receiver<Tick>> {
        if self.ws_url.is_empty() {
            bail!("bybit ws url empty");
        }

        let topics: Vec<String> = coins
            .iter()
            .map(|c| self.converter.coin_to_instrument(c))
            .filter(|s| !s.is_empty())
            .map(|s| format!("tickers.{s}"))
            .collect();
        if topics.is_empty() {
            bail!("no valid symbols for bybit topics");
        }

        let frame = json!({ "op": "subscribe", "args": topics }).to_string();
        let (tx, rx) = mpsc::channel(TICK_BUFFER);
        let converter = self.converter.clone();
        tokio::spawn(super::ws::run_feed(
            EXCHANGE,
            self.ws_url.clone(),
            Some(frame),
            shutdown,
            tx,
            move |text| decode(text, &converter),
        ));
        Ok(rx)
    }
}

#[derive(Debug, Deserialize)]
struct TickerMsg {
    #[serde(default)]
    ts: Option<i64>,
    #[serde(default)]
    data: Option<TickerData>,
    // ack frames
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    ret_msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TickerData {
    One(TickerItem),
    Many(Vec<TickerItem>),
}

#[derive(Debug, Deserialize)]
struct TickerItem {
    #[serde(default)]
    symbol: String,
    #[serde(default, rename = "lastPrice")]
    last_price: String,
}

fn decode(text: &str, converter: &SymbolConverter) -> Vec<Tick> {
    let msg: TickerMsg = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            debug!(feed = EXCHANGE, error = %e, "frame skipped");
            return Vec::new();
        }
    };

    if let Some(success) = msg.success {
        if !success {
            error!(feed = EXCHANGE, ret_msg = %msg.ret_msg, "subscribe not success");
        }
        return Vec::new();
    }

    let items = match msg.data {
        Some(TickerData::One(item)) => vec![item],
        Some(TickerData::Many(items)) => items,
        None => return Vec::new(),
    };

    let ts = msg.ts.unwrap_or_else(now_ms);
    items
        .into_iter()
        .filter_map(|item| {
            let coin = converter.instrument_to_coin(&item.symbol);
            let price = item.last_price.trim();
            if coin.is_empty() || price.is_empty() {
                return None;
            }
            Some(Tick {
                exchange: EXCHANGE.to_string(),
                coin,
                price_str: price.to_string(),
                price_num: price.parse().ok(),
                ts_ms: ts,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> SymbolConverter {
        SymbolConverter::with_quote("USDT")
    }

    #[test]
    fn decode_object_data() {
        let frame = r#"{"topic":"tickers.BTCUSDT","type":"snapshot","ts":1700000000000,"data":{"symbol":"BTCUSDT","lastPrice":"50100.5"}}"#;
        let ticks = decode(frame, &converter());
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].coin, "BTC");
        assert_eq!(ticks[0].price_str, "50100.5");
        assert_eq!(ticks[0].ts_ms, 1700000000000);
    }

    #[test]
    fn decode_array_data() {
        let frame = r#"{"topic":"tickers","ts":1,"data":[{"symbol":"BTCUSDT","lastPrice":"1"},{"symbol":"ETHUSDT","lastPrice":"2"}]}"#;
        let ticks = decode(frame, &converter());
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[1].coin, "ETH");
    }

    #[test]
    fn decode_ack_yields_nothing() {
        let frame = r#"{"success":true,"ret_msg":"","op":"subscribe","conn_id":"abc"}"#;
        assert!(decode(frame, &converter()).is_empty());
    }

    #[test]
    fn items_without_price_are_dropped() {
        let frame = r#"{"ts":1,"data":[{"symbol":"BTCUSDT","lastPrice":""},{"symbol":"","lastPrice":"3"}]}"#;
        assert!(decode(frame, &converter()).is_empty());
    }
}
