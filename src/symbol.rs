//! Coin ↔ exchange-native instrument conversion.
//!
//! Each exchange gets its own converter built once at startup and moved into
//! that exchange's feed. Conversion is pure string work: Binance/Bybit/Bitget
//! append the quote asset (`BTC` -> `BTCUSDT`), OKX uses the perpetual form
//! (`BTC` -> `BTC-USDT-SWAP`).

/// Suffix-based instrument converter for one exchange.
#[derive(Debug, Clone)]
pub struct SymbolConverter {
    suffix: String,
}

impl SymbolConverter {
    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: suffix.trim().to_uppercase(),
        }
    }

    /// Converter for the standard `<COIN><QUOTE>` instrument form.
    pub fn with_quote(quote: &str) -> Self {
        Self::new(quote)
    }

    /// Converter for OKX perpetual instruments (`<COIN>-<QUOTE>-SWAP`).
    pub fn okx_perpetual(quote: &str) -> Self {
        Self::new(&format!("-{}-SWAP", quote.trim().to_uppercase()))
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// `BTC` -> `BTCUSDT` (or `BTC-USDT-SWAP`). Already-suffixed input is
    /// passed through unchanged; empty input maps to empty output.
    pub fn coin_to_instrument(&self, coin: &str) -> String {
        let coin = coin.trim().to_uppercase();
        if coin.is_empty() {
            return coin;
        }
        if coin.ends_with(&self.suffix) {
            return coin;
        }
        format!("{}{}", coin, self.suffix)
    }

    /// `BTCUSDT` -> `BTC` (or `BTC-USDT-SWAP` -> `BTC`).
    pub fn instrument_to_coin(&self, instrument: &str) -> String {
        let sym = instrument.trim().to_uppercase();
        if sym.is_empty() {
            return sym;
        }
        sym.replace(&self.suffix, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_suffix_roundtrip() {
        let c = SymbolConverter::with_quote("usdt");
        assert_eq!(c.coin_to_instrument("btc"), "BTCUSDT");
        assert_eq!(c.instrument_to_coin("BTCUSDT"), "BTC");
        assert_eq!(c.instrument_to_coin(c.coin_to_instrument(" eth ").as_str()), "ETH");
    }

    #[test]
    fn already_suffixed_not_doubled() {
        let c = SymbolConverter::with_quote("USDT");
        assert_eq!(c.coin_to_instrument("BTCUSDT"), "BTCUSDT");
    }

    #[test]
    fn okx_perpetual_form() {
        let c = SymbolConverter::okx_perpetual("USDT");
        assert_eq!(c.coin_to_instrument("BTC"), "BTC-USDT-SWAP");
        assert_eq!(c.instrument_to_coin("BTC-USDT-SWAP"), "BTC");
    }

    #[test]
    fn empty_maps_to_empty() {
        let c = SymbolConverter::with_quote("USDT");
        assert_eq!(c.coin_to_instrument("  "), "");
        assert_eq!(c.instrument_to_coin(""), "");
    }
}
