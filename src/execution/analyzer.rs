//! Spread opportunity analysis: price gap minus costs.
//!
//! Pure arithmetic. Given both legs' prices, fee schedules, and an expected
//! holding period, decides whether the spread clears trading fees plus
//! pro-rated funding and by how much.

use std::collections::HashMap;

/// Fee profile for one exchange. Percentages are absolute (0.02 = 0.02%),
/// the funding rate is a fraction per 8-hour settlement cycle.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeFees {
    pub maker_pct: f64,
    pub taker_pct: f64,
    pub funding_rate: f64,
}

impl Default for ExchangeFees {
    fn default() -> Self {
        Self {
            maker_pct: 0.02,
            taker_pct: 0.05,
            funding_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpportunityAnalysis {
    pub coin: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_price: f64,
    pub sell_price: f64,
    /// sell − buy, always non-negative for a well-formed opportunity.
    pub spread: f64,
    pub spread_pct: f64,
    pub trading_fee_pct: f64,
    pub funding_fee_pct: f64,
    pub total_cost_pct: f64,
    pub net_profit_pct: f64,
    pub net_profit_usd: f64,
    pub quantity: f64,
    pub is_opportunity: bool,
    pub reason: String,
}

pub struct SpreadAnalyzer {
    fees: HashMap<String, ExchangeFees>,
    /// Minimum net profit percentage for a spread to count.
    pub min_profit_pct: f64,
    /// Expected holding period, pro-rates the 8-hour funding cycle.
    pub holding_hours: f64,
}

impl Default for SpreadAnalyzer {
    fn default() -> Self {
        let mut fees = HashMap::new();
        fees.insert(
            "BINANCE".to_string(),
            ExchangeFees {
                maker_pct: 0.02,
                taker_pct: 0.04,
                funding_rate: 0.001,
            },
        );
        fees.insert(
            "BYBIT".to_string(),
            ExchangeFees {
                maker_pct: 0.01,
                taker_pct: 0.03,
                funding_rate: 0.0008,
            },
        );
        Self {
            fees,
            min_profit_pct: 0.1,
            holding_hours: 1.0,
        }
    }
}

impl SpreadAnalyzer {
    pub fn set_fees(&mut self, exchange: &str, fees: ExchangeFees) {
        self.fees.insert(exchange.to_uppercase(), fees);
    }

    fn fees_for(&self, exchange: &str) -> ExchangeFees {
        self.fees.get(exchange).copied().unwrap_or_default()
    }

    /// Analyze a two-leg spread. The cheaper exchange becomes the buy leg:
    /// taker fee on the buy (immediacy), maker on the sell.
    pub fn analyze(
        &self,
        coin: &str,
        ex_a: &str,
        price_a: f64,
        ex_b: &str,
        price_b: f64,
        quantity: f64,
    ) -> OpportunityAnalysis {
        let (buy_ex, buy_px, sell_ex, sell_px) = if price_b >= price_a {
            (ex_a, price_a, ex_b, price_b)
        } else {
            (ex_b, price_b, ex_a, price_a)
        };

        let spread = sell_px - buy_px;
        let spread_pct = if buy_px > 0.0 {
            (spread / buy_px) * 100.0
        } else {
            0.0
        };

        let buy_fees = self.fees_for(buy_ex);
        let sell_fees = self.fees_for(sell_ex);
        let trading_fee_pct = buy_fees.taker_pct + sell_fees.maker_pct;
        let funding_fee_pct =
            (buy_fees.funding_rate + sell_fees.funding_rate) * self.holding_hours / 8.0 * 100.0;
        let total_cost_pct = trading_fee_pct + funding_fee_pct;

        let net_profit_pct = spread_pct - total_cost_pct;
        let net_profit_usd = buy_px * quantity * (net_profit_pct / 100.0);

        let is_opportunity = buy_px > 0.0 && net_profit_pct >= self.min_profit_pct;
        let reason = if is_opportunity {
            format!(
                "BUY_{buy_ex}_SELL_{sell_ex}: spread={spread_pct:.4}%, cost={total_cost_pct:.4}%, net={net_profit_pct:.4}%, usd={net_profit_usd:.2}"
            )
        } else {
            format!(
                "spread too small: {spread_pct:.4}% < min {:.4}% + cost {total_cost_pct:.4}%",
                self.min_profit_pct
            )
        };

        OpportunityAnalysis {
            coin: coin.to_string(),
            buy_exchange: buy_ex.to_string(),
            sell_exchange: sell_ex.to_string(),
            buy_price: buy_px,
            sell_price: sell_px,
            spread,
            spread_pct,
            trading_fee_pct,
            funding_fee_pct,
            total_cost_pct,
            net_profit_pct,
            net_profit_usd,
            quantity,
            is_opportunity,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_spread_is_an_opportunity() {
        let analyzer = SpreadAnalyzer::default();
        let a = analyzer.analyze("BTC", "BINANCE", 50000.0, "BYBIT", 50300.0, 1.0);
        assert!(a.is_opportunity, "{}", a.reason);
        assert_eq!(a.buy_exchange, "BINANCE");
        assert_eq!(a.sell_exchange, "BYBIT");
        assert!(a.net_profit_pct > 0.0);
        assert!(a.net_profit_usd > 0.0);
    }

    #[test]
    fn cheaper_leg_becomes_the_buy_in_both_directions() {
        let analyzer = SpreadAnalyzer::default();
        let a = analyzer.analyze("BTC", "BINANCE", 50300.0, "BYBIT", 50000.0, 1.0);
        assert_eq!(a.buy_exchange, "BYBIT");
        assert_eq!(a.sell_exchange, "BINANCE");
        assert!(a.spread >= 0.0);
    }

    #[test]
    fn thin_spread_is_rejected_by_fees() {
        let analyzer = SpreadAnalyzer::default();
        // 0.02% spread against ~0.07% trading fees
        let a = analyzer.analyze("BTC", "BINANCE", 50000.0, "BYBIT", 50010.0, 1.0);
        assert!(!a.is_opportunity);
        assert!(a.net_profit_pct < 0.0);
    }

    #[test]
    fn funding_scales_with_holding_period() {
        let mut analyzer = SpreadAnalyzer::default();
        analyzer.holding_hours = 8.0;
        let long = analyzer.analyze("BTC", "BINANCE", 50000.0, "BYBIT", 50300.0, 1.0);
        analyzer.holding_hours = 1.0;
        let short = analyzer.analyze("BTC", "BINANCE", 50000.0, "BYBIT", 50300.0, 1.0);
        assert!(long.funding_fee_pct > short.funding_fee_pct);
    }

    #[test]
    fn unknown_exchange_uses_default_fees() {
        let analyzer = SpreadAnalyzer::default();
        let a = analyzer.analyze("BTC", "OKX", 100.0, "BITGET", 101.0, 1.0);
        assert!(a.trading_fee_pct > 0.0);
    }
}
