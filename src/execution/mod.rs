//! Order-execution stubs.
//!
//! The monitor can hand a confirmed opportunity to an `OrderManager`, which
//! places the two legs through `OrderClient` implementations. The only
//! shipped client is the paper one: immediate in-memory fills, no retries,
//! no margin tracking. Live clients are out of scope.

pub mod analyzer;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use analyzer::OpportunityAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Pending,
    Filled,
    Canceled,
}

#[derive(Debug, Clone)]
pub struct OrderStatus {
    pub order_id: String,
    pub coin: String,
    pub side: Side,
    pub quantity: f64,
    pub executed_quantity: f64,
    pub price: f64,
    pub avg_executed_price: f64,
    pub state: OrderState,
    pub created_at_ms: i64,
}

#[async_trait]
pub trait OrderClient: Send + Sync {
    /// Place an order, returning the exchange order id. `price` is ignored
    /// for market orders.
    async fn place_order(
        &self,
        coin: &str,
        side: Side,
        quantity: f64,
        price: f64,
        market: bool,
    ) -> Result<String>;

    async fn cancel_order(&self, coin: &str, order_id: &str) -> Result<()>;

    async fn order_status(&self, coin: &str, order_id: &str) -> Result<OrderStatus>;
}

/// In-memory client that fills every order immediately at the quoted price.
pub struct PaperOrderClient {
    orders: Mutex<HashMap<String, OrderStatus>>,
}

impl PaperOrderClient {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for PaperOrderClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderClient for PaperOrderClient {
    async fn place_order(
        &self,
        coin: &str,
        side: Side,
        quantity: f64,
        price: f64,
        _market: bool,
    ) -> Result<String> {
        if !(quantity > 0.0) {
            bail!("invalid quantity");
        }
        if !(price.is_finite() && price > 0.0) {
            bail!("invalid price");
        }

        let order_id = Uuid::new_v4().to_string();
        let status = OrderStatus {
            order_id: order_id.clone(),
            coin: coin.to_string(),
            side,
            quantity,
            executed_quantity: quantity,
            price,
            avg_executed_price: price,
            state: OrderState::Filled,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
        };
        self.orders.lock().insert(order_id.clone(), status);
        Ok(order_id)
    }

    async fn cancel_order(&self, _coin: &str, order_id: &str) -> Result<()> {
        let mut orders = self.orders.lock();
        let Some(status) = orders.get_mut(order_id) else {
            bail!("unknown order {order_id}");
        };
        status.state = OrderState::Canceled;
        Ok(())
    }

    async fn order_status(&self, _coin: &str, order_id: &str) -> Result<OrderStatus> {
        self.orders
            .lock()
            .get(order_id)
            .cloned()
            .with_context(|| format!("unknown order {order_id}"))
    }
}

/// Both legs of an executed spread.
#[derive(Debug, Clone)]
pub struct SpreadExecution {
    pub coin: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_order_id: String,
    pub sell_order_id: String,
    pub quantity: f64,
    pub expected_profit_usd: f64,
    pub expected_profit_pct: f64,
}

/// Holds one order client per exchange tag and executes confirmed spreads.
pub struct OrderManager {
    clients: HashMap<String, Arc<dyn OrderClient>>,
    pub default_quantity: f64,
}

impl OrderManager {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            default_quantity: 1.0,
        }
    }

    /// Paper manager with one client per given exchange tag.
    pub fn paper(exchanges: &[String]) -> Self {
        let mut mgr = Self::new();
        for ex in exchanges {
            mgr.register(ex, Arc::new(PaperOrderClient::new()));
        }
        mgr
    }

    pub fn register(&mut self, exchange: &str, client: Arc<dyn OrderClient>) {
        self.clients.insert(exchange.to_uppercase(), client);
    }

    pub fn client(&self, exchange: &str) -> Option<&Arc<dyn OrderClient>> {
        self.clients.get(&exchange.to_uppercase())
    }

    /// Place both legs of an analyzed opportunity: market buy on the cheap
    /// leg, market sell on the expensive one.
    pub async fn execute_spread(&self, analysis: &OpportunityAnalysis) -> Result<SpreadExecution> {
        if !analysis.is_opportunity {
            bail!("not an opportunity: {}", analysis.reason);
        }

        let buy = self
            .client(&analysis.buy_exchange)
            .with_context(|| format!("no order client for {}", analysis.buy_exchange))?;
        let sell = self
            .client(&analysis.sell_exchange)
            .with_context(|| format!("no order client for {}", analysis.sell_exchange))?;

        let qty = if analysis.quantity > 0.0 {
            analysis.quantity
        } else {
            self.default_quantity
        };

        let buy_order_id = buy
            .place_order(&analysis.coin, Side::Buy, qty, analysis.buy_price, true)
            .await
            .context("buy leg failed")?;
        let sell_order_id = sell
            .place_order(&analysis.coin, Side::Sell, qty, analysis.sell_price, true)
            .await
            .context("sell leg failed")?;

        Ok(SpreadExecution {
            coin: analysis.coin.clone(),
            buy_exchange: analysis.buy_exchange.clone(),
            sell_exchange: analysis.sell_exchange.clone(),
            buy_order_id,
            sell_order_id,
            quantity: qty,
            expected_profit_usd: analysis.net_profit_usd,
            expected_profit_pct: analysis.net_profit_pct,
        })
    }
}

impl Default for OrderManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::analyzer::SpreadAnalyzer;
    use super::*;

    #[tokio::test]
    async fn paper_client_fills_immediately() {
        let client = PaperOrderClient::new();
        let id = client
            .place_order("BTC", Side::Buy, 2.0, 50000.0, true)
            .await
            .unwrap();
        let status = client.order_status("BTC", &id).await.unwrap();
        assert_eq!(status.state, OrderState::Filled);
        assert_eq!(status.executed_quantity, 2.0);
        assert_eq!(status.avg_executed_price, 50000.0);
    }

    #[tokio::test]
    async fn paper_client_rejects_bad_inputs() {
        let client = PaperOrderClient::new();
        assert!(client
            .place_order("BTC", Side::Buy, 0.0, 50000.0, true)
            .await
            .is_err());
        assert!(client
            .place_order("BTC", Side::Buy, 1.0, f64::NAN, true)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn execute_spread_places_both_legs() {
        let analyzer = SpreadAnalyzer::default();
        let analysis = analyzer.analyze("BTC", "BINANCE", 50000.0, "BYBIT", 50300.0, 1.0);
        assert!(analysis.is_opportunity);

        let mgr = OrderManager::paper(&["BINANCE".to_string(), "BYBIT".to_string()]);
        let exec = mgr.execute_spread(&analysis).await.unwrap();
        assert_eq!(exec.buy_exchange, "BINANCE");
        assert_eq!(exec.sell_exchange, "BYBIT");

        let buy = mgr
            .client("BINANCE")
            .unwrap()
            .order_status("BTC", &exec.buy_order_id)
            .await
            .unwrap();
        assert_eq!(buy.side, Side::Buy);
        let sell = mgr
            .client("BYBIT")
            .unwrap()
            .order_status("BTC", &exec.sell_order_id)
            .await
            .unwrap();
        assert_eq!(sell.side, Side::Sell);
    }

    #[tokio::test]
    async fn rejected_analysis_is_not_executed() {
        let analyzer = SpreadAnalyzer::default();
        let analysis = analyzer.analyze("BTC", "BINANCE", 50000.0, "BYBIT", 50010.0, 1.0);
        let mgr = OrderManager::paper(&["BINANCE".to_string(), "BYBIT".to_string()]);
        assert!(mgr.execute_spread(&analysis).await.is_err());
    }
}
