//! TOML configuration: schema, defaults, validation.
//!
//! Everything is frozen at startup. A config that validates yields a runnable
//! system; validation failures are fatal before any feed is started.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub symbols: SymbolsConfig,
    #[serde(default)]
    pub arbitrage: ArbitrageConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub exchanges: HashMap<String, ExchangeConfig>,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub sqlite: SqliteConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub print_every_min: i64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SymbolsConfig {
    #[serde(default)]
    pub list: Vec<String>,
    /// Quote asset handed to the per-exchange symbol converters.
    #[serde(default)]
    pub quote: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ArbitrageConfig {
    #[serde(default)]
    pub delta_threshold: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MonitorConfig {
    /// Display/trade order override. Empty means all enabled exchanges in
    /// alphabetical order.
    #[serde(default)]
    pub exchanges: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExchangeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub perpetual_ws_url: String,
    #[serde(default)]
    pub spot_ws_url: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RedisConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub ttl_seconds: i64,
    #[serde(default)]
    pub signal_stream: String,
    #[serde(default)]
    pub signal_channel: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SqliteConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PostgresConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub dsn: String,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let mut cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.apply_defaults();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse from a TOML string, applying the same defaults and validation
    /// as `load`.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut cfg: Config = toml::from_str(contents).context("parse config")?;
        cfg.apply_defaults();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_defaults(&mut self) {
        if self.app.print_every_min <= 0 {
            self.app.print_every_min = 5;
        }
        if self.arbitrage.delta_threshold <= 0.0 {
            self.arbitrage.delta_threshold = 5.0;
        }
        if self.symbols.quote.trim().is_empty() {
            self.symbols.quote = "USDT".to_string();
        }

        if self.redis.ttl_seconds <= 0 {
            self.redis.ttl_seconds = 300;
        }
        if self.redis.prefix.trim().is_empty() {
            self.redis.prefix = "xarb".to_string();
        }
        if self.redis.signal_stream.trim().is_empty() {
            self.redis.signal_stream = format!("{}:signals", self.redis.prefix);
        }
        if self.redis.signal_channel.trim().is_empty() {
            self.redis.signal_channel = format!("{}:signals:pub", self.redis.prefix);
        }
    }

    fn validate(&mut self) -> Result<()> {
        self.symbols.list = normalize_coins(&self.symbols.list);
        if self.symbols.list.is_empty() {
            bail!("symbols.list is empty");
        }

        for (name, ex) in &self.exchanges {
            if ex.enabled && ex.perpetual_ws_url.trim().is_empty() {
                bail!("exchanges.{name}.perpetual_ws_url empty but enabled");
            }
        }

        if self.redis.enabled && self.redis.addr.trim().is_empty() {
            bail!("redis.addr empty but redis enabled");
        }
        if self.sqlite.enabled && self.sqlite.path.trim().is_empty() {
            bail!("sqlite.path empty but sqlite enabled");
        }
        if self.postgres.enabled && self.postgres.dsn.trim().is_empty() {
            bail!("postgres.dsn empty but postgres enabled");
        }
        Ok(())
    }

    /// Uppercase tags of the exchanges to monitor, in display order.
    ///
    /// The `monitor.exchanges` override is filtered to enabled entries and
    /// keeps its configured order; otherwise all enabled exchanges are
    /// returned in alphabetical order.
    pub fn enabled_exchanges(&self) -> Vec<String> {
        if !self.monitor.exchanges.is_empty() {
            return self
                .monitor
                .exchanges
                .iter()
                .filter_map(|name| {
                    let key = name.trim().to_lowercase();
                    match self.exchanges.get(&key) {
                        Some(ex) if ex.enabled => Some(key.to_uppercase()),
                        _ => None,
                    }
                })
                .collect();
        }

        let mut all: Vec<String> = self
            .exchanges
            .iter()
            .filter(|(_, ex)| ex.enabled)
            .map(|(name, _)| name.to_uppercase())
            .collect();
        all.sort();
        all
    }
}

/// Uppercase, trim, and deduplicate the coin list, preserving first-seen
/// order.
fn normalize_coins(coins: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(coins.len());
    for c in coins {
        let u = c.trim().to_uppercase();
        if u.is_empty() || !seen.insert(u.clone()) {
            continue;
        }
        out.push(u);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [symbols]
        list = ["btc", "ETH", "btc", " "]

        [exchanges.binance]
        enabled = true
        perpetual_ws_url = "wss://fstream.binance.com"

        [exchanges.bybit]
        enabled = true
        perpetual_ws_url = "wss://stream.bybit.com/v5/public/linear"
    "#;

    #[test]
    fn defaults_applied() {
        let cfg = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(cfg.app.print_every_min, 5);
        assert_eq!(cfg.arbitrage.delta_threshold, 5.0);
        assert_eq!(cfg.symbols.quote, "USDT");
        assert_eq!(cfg.redis.ttl_seconds, 300);
        assert_eq!(cfg.redis.prefix, "xarb");
        assert_eq!(cfg.redis.signal_stream, "xarb:signals");
        assert_eq!(cfg.redis.signal_channel, "xarb:signals:pub");
    }

    #[test]
    fn zero_threshold_replaced_by_default() {
        let toml = format!("{MINIMAL}\n[arbitrage]\ndelta_threshold = 0.0\n");
        let cfg = Config::from_toml(&toml).unwrap();
        assert_eq!(cfg.arbitrage.delta_threshold, 5.0);
    }

    #[test]
    fn coins_deduped_case_insensitive() {
        let cfg = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(cfg.symbols.list, vec!["BTC", "ETH"]);
    }

    #[test]
    fn empty_coin_list_rejected() {
        let toml = r#"
            [symbols]
            list = []
        "#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn enabled_exchange_requires_ws_url() {
        let toml = r#"
            [symbols]
            list = ["BTC"]

            [exchanges.okx]
            enabled = true
        "#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn enabled_exchanges_alphabetical_without_override() {
        let toml = format!(
            "{MINIMAL}\n[exchanges.okx]\nenabled = true\nperpetual_ws_url = \"wss://ws.okx.com:8443/ws/v5/public\"\n"
        );
        let cfg = Config::from_toml(&toml).unwrap();
        assert_eq!(cfg.enabled_exchanges(), vec!["BINANCE", "BYBIT", "OKX"]);
    }

    #[test]
    fn monitor_override_filters_disabled() {
        let toml = format!(
            "{MINIMAL}\n[monitor]\nexchanges = [\"bybit\", \"okx\", \"binance\"]\n"
        );
        let cfg = Config::from_toml(&toml).unwrap();
        assert_eq!(cfg.enabled_exchanges(), vec!["BYBIT", "BINANCE"]);
    }

    #[test]
    fn enabled_redis_requires_addr() {
        let toml = format!("{MINIMAL}\n[redis]\nenabled = true\n");
        assert!(Config::from_toml(&toml).is_err());
    }
}
