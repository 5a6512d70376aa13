//! Core domain values shared across the pipeline.

/// One price event emitted by a feed for a (coin, exchange) pair.
///
/// `coin` is the configured coin token (`BTC`), not the exchange-native
/// instrument; feeds normalize before emitting. `price_str` preserves the
/// wire formatting for display, `price_num` is the best-effort parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub exchange: String,
    pub coin: String,
    pub price_str: String,
    pub price_num: Option<f64>,
    pub ts_ms: i64,
}

/// Price movement relative to the previous parsed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Same,
    Up,
    Down,
}

/// Edge event raised when a coin's spread band changes to a non-zero band.
///
/// `payload` is the full snapshot render at detection time so downstream can
/// persist or print it verbatim without holding a board reference.
#[derive(Debug, Clone)]
pub struct Signal {
    pub coin: String,
    pub delta: f64,
    pub band: i8,
    pub threshold: f64,
    pub payload: String,
}
