//! Binance USDⓈ-M futures miniTicker feed.
//!
//! Subscription is carried in the URL query (combined stream endpoint), so
//! no subscribe envelope is sent after connect.

use anyhow::{bail, Result};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::feeds::{now_ms, PriceFeed, TICK_BUFFER};
use crate::models::Tick;
use crate::symbol::SymbolConverter;

pub const EXCHANGE: &str = "BINANCE";

pub struct BinanceFeed {
    ws_url: String,
    converter: SymbolConverter,
}

impl BinanceFeed {
    pub fn new(ws_url: &str, converter: SymbolConverter) -> Self {
        Self {
            ws_url: ws_url.trim().to_string(),
            converter,
        }
    }
}

impl PriceFeed for BinanceFeed {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    fn subscribe(
        &self,
        shutdown: watch::Receiver<bool>,
        coins: &[String],
    ) -> Result<mpsc::Receiver<Tick>> {
        let url = build_combined_url(&self.ws_url, coins, &self.converter)?;
        let (tx, rx) = mpsc::channel(TICK_BUFFER);
        let converter = self.converter.clone();
        tokio::spawn(super::ws::run_feed(
            EXCHANGE,
            url,
            None,
            shutdown,
            tx,
            move |text| decode(text, &converter),
        ));
        Ok(rx)
    }
}

/// `wss://host/stream?streams=btcusdt@miniTicker/ethusdt@miniTicker`
fn build_combined_url(base: &str, coins: &[String], converter: &SymbolConverter) -> Result<String> {
    if base.is_empty() {
        bail!("binance ws url empty");
    }

    let streams: Vec<String> = coins
        .iter()
        .map(|c| converter.coin_to_instrument(c))
        .filter(|s| !s.is_empty())
        .map(|s| format!("{}@miniTicker", s.to_lowercase()))
        .collect();
    if streams.is_empty() {
        bail!("no valid symbols for binance streams");
    }

    Ok(format!(
        "{}/stream?streams={}",
        base.trim_end_matches('/'),
        streams.join("/")
    ))
}

#[derive(Debug, Deserialize)]
struct Combined {
    data: MiniTicker,
}

#[derive(Debug, Deserialize)]
struct MiniTicker {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "E", default)]
    event_time: Option<i64>,
}

fn decode(text: &str, converter: &SymbolConverter) -> Vec<Tick> {
    let msg: Combined = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            // subscription acks and list replies don't carry `data`
            debug!(feed = EXCHANGE, error = %e, "frame skipped");
            return Vec::new();
        }
    };

    let coin = converter.instrument_to_coin(&msg.data.symbol);
    let price = msg.data.close.trim();
    if coin.is_empty() || price.is_empty() {
        return Vec::new();
    }

    vec![Tick {
        exchange: EXCHANGE.to_string(),
        coin,
        price_str: price.to_string(),
        price_num: price.parse().ok(),
        ts_ms: msg.data.event_time.unwrap_or_else(now_ms),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> SymbolConverter {
        SymbolConverter::with_quote("USDT")
    }

    #[test]
    fn combined_url_lowercases_streams() {
        let url = build_combined_url(
            "wss://fstream.binance.com",
            &["BTC".to_string(), "eth".to_string()],
            &converter(),
        )
        .unwrap();
        assert_eq!(
            url,
            "wss://fstream.binance.com/stream?streams=btcusdt@miniTicker/ethusdt@miniTicker"
        );
    }

    #[test]
    fn empty_base_rejected() {
        assert!(build_combined_url("", &["BTC".to_string()], &converter()).is_err());
    }

    #[test]
    fn decode_mini_ticker_frame() {
        let frame = r#"{"stream":"btcusdt@miniTicker","data":{"e":"24hrMiniTicker","E":1700000000000,"s":"BTCUSDT","c":"50123.40","o":"49000","h":"51000","l":"48000"}}"#;
        let ticks = decode(frame, &converter());
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].exchange, "BINANCE");
        assert_eq!(ticks[0].coin, "BTC");
        assert_eq!(ticks[0].price_str, "50123.40");
        assert_eq!(ticks[0].price_num, Some(50123.40));
        assert_eq!(ticks[0].ts_ms, 1700000000000);
    }

    #[test]
    fn decode_ack_frame_yields_nothing() {
        assert!(decode(r#"{"result":null,"id":1}"#, &converter()).is_empty());
    }
}
