//! Terminal line rendering.
//!
//! Pure function of (board snapshot, mode). Live lines lead with a carriage
//! return and end with clear-to-end-of-line so each redraw overwrites the
//! previous one; snapshot lines are plain and safe to log.

use crate::board::{max_abs_delta_pair, BoardSnapshot, CoinRow};
use crate::models::Direction;

const ANSI_RESET: &str = "\x1b[0m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_DIM: &str = "\x1b[2m";
const ANSI_CLEAR_EOL: &str = "\x1b[K";

fn colorize(s: &str, color: &str) -> String {
    format!("{color}{s}{ANSI_RESET}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Live,
    Snapshot,
}

pub struct Renderer {
    threshold: f64,
    /// Display order for exchange cells. Empty means whatever the row has,
    /// alphabetically.
    exchanges: Vec<String>,
}

impl Renderer {
    pub fn new(threshold: f64, exchanges: Vec<String>) -> Self {
        Self {
            threshold,
            exchanges,
        }
    }

    pub fn render(&self, snap: &BoardSnapshot, mode: RenderMode) -> String {
        let mut out = String::new();
        if mode == RenderMode::Live {
            out.push('\r');
        }

        out.push_str(&colorize("[XARB] ", ANSI_DIM));

        for (i, coin) in snap.order.iter().enumerate() {
            if i > 0 {
                out.push_str(&colorize("  ||  ", ANSI_DIM));
            }

            let Some(row) = snap.rows.get(coin) else {
                continue;
            };

            let exchanges = self.display_exchanges(row);
            if exchanges.is_empty() {
                out.push_str(coin);
                out.push(' ');
                out.push_str(&colorize("--", ANSI_YELLOW));
                continue;
            }

            out.push_str(coin);
            out.push(' ');
            for (j, ex) in exchanges.iter().enumerate() {
                if j > 0 {
                    out.push('/');
                }
                out.push_str(&self.render_cell(row, ex));
            }

            if exchanges.len() >= 2 {
                out.push(' ');
                out.push_str(&self.render_delta(row, &exchanges));
            }
        }

        if mode == RenderMode::Live {
            out.push_str(ANSI_CLEAR_EOL);
        }
        out
    }

    fn display_exchanges(&self, row: &CoinRow) -> Vec<String> {
        if !self.exchanges.is_empty() {
            return self
                .exchanges
                .iter()
                .filter(|ex| row.exchanges.contains_key(*ex))
                .cloned()
                .collect();
        }
        let mut all: Vec<String> = row.exchanges.keys().cloned().collect();
        all.sort();
        all
    }

    fn render_cell(&self, row: &CoinRow, ex: &str) -> String {
        let label = initial(ex);
        let Some(cell) = row.exchanges.get(ex) else {
            return colorize(&format!("{label}:--"), ANSI_YELLOW);
        };
        if !cell.seen {
            return colorize(&format!("{label}:--"), ANSI_YELLOW);
        }

        let price = if cell.str.is_empty() { "--" } else { &cell.str };
        let color = if cell.parsed {
            match cell.direction {
                Direction::Up => ANSI_GREEN,
                Direction::Down => ANSI_RED,
                Direction::Same => ANSI_YELLOW,
            }
        } else {
            ANSI_YELLOW
        };
        colorize(&format!("{label}:{price}"), color)
    }

    fn render_delta(&self, row: &CoinRow, exchanges: &[String]) -> String {
        match max_abs_delta_pair(row, exchanges) {
            Some((delta, a, b)) => {
                let text = format!("Δ={delta:+.2}({}-{})", initial(a), initial(b));
                let color = if delta >= self.threshold {
                    ANSI_GREEN
                } else if delta <= -self.threshold {
                    ANSI_RED
                } else {
                    ANSI_YELLOW
                };
                colorize(&text, color)
            }
            None => colorize("Δ=--", ANSI_YELLOW),
        }
    }
}

/// One-letter exchange label for the compact line format.
fn initial(ex: &str) -> &str {
    ex.get(..1).unwrap_or(ex)
}
