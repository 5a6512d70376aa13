//! Thread-safe latest-price board.
//!
//! One cell per (coin, exchange). Coins are fixed at construction in
//! configured order; exchange cells appear lazily on first tick. All public
//! operations take the single board mutex; readers get detached copies.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::models::{Direction, Tick};

/// Latest price state for one (coin, exchange) slot.
#[derive(Debug, Clone, Default)]
pub struct PriceCell {
    /// Most recent raw price string, parsed or not.
    pub str: String,
    /// Most recent successfully parsed value.
    pub num: f64,
    /// True once any value has parsed; never reverts.
    pub has_num: bool,
    pub direction: Direction,
    pub seen: bool,
    pub parsed: bool,
}

impl PriceCell {
    /// Apply a raw price string. Returns true when the display changed.
    fn apply(&mut self, price: &str) -> bool {
        if self.str == price {
            self.seen = true;
            return false;
        }

        self.str = price.to_string();
        self.seen = true;

        let Ok(n) = price.parse::<f64>() else {
            self.parsed = false;
            self.direction = Direction::Same;
            return true;
        };

        self.parsed = true;
        if !self.has_num {
            self.has_num = true;
            self.num = n;
            self.direction = Direction::Same;
            return true;
        }

        self.direction = if n > self.num {
            Direction::Up
        } else if n < self.num {
            Direction::Down
        } else {
            Direction::Same
        };
        self.num = n;
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoinRow {
    pub exchanges: HashMap<String, PriceCell>,
}

/// Detached read-only copy of the board for rendering and inspection.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub order: Vec<String>,
    pub rows: HashMap<String, CoinRow>,
}

pub struct Board {
    inner: Mutex<Inner>,
}

struct Inner {
    order: Vec<String>,
    rows: HashMap<String, CoinRow>,
}

impl Board {
    /// Coins are uppercased and trimmed; empties are dropped. Ticks for coins
    /// outside this set are never admitted.
    pub fn new(coins: &[String]) -> Self {
        let mut order = Vec::with_capacity(coins.len());
        let mut rows = HashMap::with_capacity(coins.len());
        for coin in coins {
            let u = coin.trim().to_uppercase();
            if u.is_empty() {
                continue;
            }
            order.push(u.clone());
            rows.insert(u, CoinRow::default());
        }
        Self {
            inner: Mutex::new(Inner { order, rows }),
        }
    }

    /// Apply a tick. Returns true when the display changed.
    pub fn apply(&self, tick: &Tick) -> bool {
        let ex = tick.exchange.trim().to_uppercase();
        let coin = tick.coin.trim().to_uppercase();
        let price = tick.price_str.trim();
        if ex.is_empty() || coin.is_empty() || price.is_empty() {
            return false;
        }

        let mut inner = self.inner.lock();
        let Some(row) = inner.rows.get_mut(&coin) else {
            return false;
        };
        row.exchanges.entry(ex).or_default().apply(price)
    }

    pub fn coins(&self) -> Vec<String> {
        self.inner.lock().order.clone()
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        let inner = self.inner.lock();
        BoardSnapshot {
            order: inner.order.clone(),
            rows: inner.rows.clone(),
        }
    }

    /// Spread and band for a coin over the given exchange display order.
    ///
    /// All C(n,2) pairs are compared and the pair with the largest absolute
    /// delta wins; both cells of a pair must have parsed numeric values.
    /// Returns `None` when no pair is computable or the threshold is not
    /// positive.
    pub fn delta_band(&self, coin: &str, exchanges: &[String], threshold: f64) -> Option<(f64, i8)> {
        let coin = coin.trim().to_uppercase();
        if coin.is_empty() || threshold <= 0.0 {
            return None;
        }

        let inner = self.inner.lock();
        let row = inner.rows.get(&coin)?;
        let delta = max_abs_delta(row, exchanges)?;
        Some((delta, classify(delta, threshold)))
    }
}

/// Largest-|delta| pairwise spread across the display order, `price(b) - price(a)`
/// for each ordered pair (a earlier in the list).
pub(crate) fn max_abs_delta(row: &CoinRow, exchanges: &[String]) -> Option<f64> {
    max_abs_delta_pair(row, exchanges).map(|(d, _, _)| d)
}

pub(crate) fn max_abs_delta_pair<'a>(
    row: &CoinRow,
    exchanges: &'a [String],
) -> Option<(f64, &'a str, &'a str)> {
    let mut best: Option<(f64, &str, &str)> = None;
    for i in 0..exchanges.len() {
        for j in (i + 1)..exchanges.len() {
            let (Some(a), Some(b)) = (
                row.exchanges.get(&exchanges[i]),
                row.exchanges.get(&exchanges[j]),
            ) else {
                continue;
            };
            if !(a.parsed && a.has_num && b.parsed && b.has_num) {
                continue;
            }
            let d = b.num - a.num;
            if best.map_or(true, |(bd, _, _)| d.abs() > bd.abs()) {
                best = Some((d, &exchanges[i], &exchanges[j]));
            }
        }
    }
    best
}

/// Symmetric threshold classification: `+1` at or above, `-1` at or below the
/// negated threshold, `0` between.
pub(crate) fn classify(delta: f64, threshold: f64) -> i8 {
    if delta >= threshold {
        1
    } else if delta <= -threshold {
        -1
    } else {
        0
    }
}
