//! OKX v5 public tickers feed (perpetual swap instruments).

use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::feeds::{now_ms, PriceFeed, TICK_BUFFER};
use crate::models::Tick;
use crate::symbol::SymbolConverter;

pub const EXCHANGE: &str = "OKX";

pub struct OkxFeed {
    ws_url: String,
    converter: SymbolConverter,
}

impl OkxFeed {
    pub fn new(ws_url: &str, converter: SymbolConverter) -> Self {
        Self {
            ws_url: ws_url.trim().to_string(),
            converter,
        }
    }
}

impl PriceFeed for OkxFeed {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    fn subscribe(
        &self,
        shutdown: watch::Receiver<bool>,
        coins: &[String],
    ) -> Result<mpsc::Receiver<Tick>> {
        if self.ws_url.is_empty() {
            bail!("okx ws url empty");
        }

        let args: Vec<serde_json::Value> = coins
            .iter()
            .map(|c| self.converter.coin_to_instrument(c))
            .filter(|s| !s.is_empty())
            .map(|inst| json!({ "channel": "tickers", "instId": inst }))
            .collect();
        if args.is_empty() {
            bail!("no valid instruments for okx subscription");
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
    let msg: TickerMsg = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            debug!(feed = EXCHANGE, error = %e, "frame skipped");
            return Vec::new();
        }
    };

    // event/ack frames carry no data
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
        SymbolConverter::okx_perpetual("USDT")
    }

    #[test]
    fn decode_ticker_frame_with_event_ts() {
        let frame = r#"{"arg":{"channel":"tickers","instId":"BTC-USDT-SWAP"},"data":[{"instId":"BTC-USDT-SWAP","last":"50200.1","ts":"1700000000123"}]}"#;
        let ticks = decode(frame, &converter());
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].coin, "BTC");
        assert_eq!(ticks[0].price_str, "50200.1");
        assert_eq!(ticks[0].ts_ms, 1700000000123);
    }

    #[test]
    fn decode_subscribe_ack_yields_nothing() {
        let frame = r#"{"event":"subscribe","arg":{"channel":"tickers","instId":"BTC-USDT-SWAP"},"connId":"x"}"#;
        assert!(decode(frame, &converter()).is_empty());
    }
}
