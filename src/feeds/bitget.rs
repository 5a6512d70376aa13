//! Bitget public ticker feed.
//!
//! The subscribe envelope carries the market type (`SPOT`/`PERP`) alongside
//! the channel; the frame shape is otherwise OKX-like.

use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::feeds::{now_ms, PriceFeed, TICK_BUFFER};
use crate::models::Tick;
use crate::symbol::SymbolConverter;

pub const EXCHANGE: &str = "BITGET";

pub struct BitgetFeed {
    ws_url: String,
    inst_type: &'static str,
    converter: SymbolConverter,
}

impl BitgetFeed {
    pub fn new(ws_url: &str, inst_type: &'static str, converter: SymbolConverter) -> Self {
        Self {
            ws_url: ws_url.trim().to_string(),
            inst_type,
            converter,
        }
    }

    pub fn perpetual(ws_url: &str, converter: SymbolConverter) -> Self {
        Self::new(ws_url, "PERP", converter)
    }
}

impl PriceFeed for BitgetFeed {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    fn subscribe(
        &self,
        shutdown: watch::Receiver<bool>,
        coins: &[String],
    ) -> Result<mpsc::Receiver<Tick>> {
        if self.ws_url.is_empty() {
            bail!("bitget ws url empty");
        }

        let args: Vec<serde_json::Value> = coins
            .iter()
            .map(|c| self.converter.coin_to_instrument(c))
            .filter(|s| !s.is_empty())
            .map(|inst| {
                json!({
                    "instType": self.inst_type,
                    "channel": "ticker",
                    "instId": inst,
                })
            })
            .collect();
        if args.is_empty() {
            bail!("no valid instruments for bitget subscription");
        }

        let frame = json!({ "op": "subscribe", "args": args }).to_string();
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
    data: Vec<TickerData>,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    #[serde(rename = "instId", default)]
    inst_id: String,
    #[serde(default)]
    last: String,
    #[serde(default)]
    ts: String,
}

fn decode(text: &str, converter: &SymbolConverter) -> Vec<Tick> {
    // plain "pong" replies are not JSON
    if text.eq_ignore_ascii_case("pong") {
        return Vec::new();
    }

    let msg: TickerMsg = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            debug!(feed = EXCHANGE, error = %e, "frame skipped");
            return Vec::new();
        }
    };

    msg.data
        .into_iter()
        .filter_map(|d| {
            let coin = converter.instrument_to_coin(&d.inst_id);
            let price = d.last.trim();
            if coin.is_empty() || price.is_empty() {
                return None;
            }
            Some(Tick {
                exchange: EXCHANGE.to_string(),
                coin,
                price_str: price.to_string(),
                price_num: price.parse().ok(),
                ts_ms: d.ts.parse().unwrap_or_else(|_| now_ms()),
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
    fn decode_ticker_frame() {
        let frame = r#"{"action":"snapshot","arg":{"instType":"PERP","channel":"ticker","instId":"BTCUSDT"},"data":[{"instId":"BTCUSDT","last":"49999.9","ts":"1700000000456"}]}"#;
        let ticks = decode(frame, &converter());
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].coin, "BTC");
        assert_eq!(ticks[0].ts_ms, 1700000000456);
    }

    #[test]
    fn decode_pong_and_ack_yield_nothing() {
        assert!(decode("pong", &converter()).is_empty());
        let ack = r#"{"event":"subscribe","arg":{"instType":"PERP","channel":"ticker","instId":"BTCUSDT"}}"#;
        assert!(decode(ack, &converter()).is_empty());
    }
}
