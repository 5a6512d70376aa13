//! The monitor loop: fan-in consumer, board owner, signal emitter.
//!
//! Single-task by design. Feeds run concurrently and funnel into one merged
//! channel; this loop is the serialization point for board writes, rendering,
//! sink output, and persistence.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::board::Board;
use crate::detector::BandTracker;
use crate::execution::analyzer::SpreadAnalyzer;
use crate::execution::OrderManager;
use crate::feeds::{merge_feeds, PriceFeed};
use crate::models::{Signal, Tick};
use crate::render::{RenderMode, Renderer};
use crate::sink::Sink;
use crate::storage::Repository;

/// Optional signal-to-order hook: fee analysis plus the order clients.
pub struct Executor {
    pub analyzer: SpreadAnalyzer,
    pub orders: OrderManager,
}

pub struct MonitorDeps {
    pub feeds: Vec<Box<dyn PriceFeed>>,
    pub coins: Vec<String>,
    /// Display/trade order of exchange tags.
    pub exchanges: Vec<String>,
    pub print_every_min: i64,
    pub delta_threshold: f64,
    pub sink: Box<dyn Sink>,
    pub repo: Arc<dyn Repository>,
    pub executor: Option<Executor>,
}

pub struct Monitor {
    feeds: Vec<Box<dyn PriceFeed>>,
    coins: Vec<String>,
    exchanges: Vec<String>,
    print_every_min: i64,
    delta_threshold: f64,
    sink: Box<dyn Sink>,
    repo: Arc<dyn Repository>,
    executor: Option<Executor>,
    board: Board,
    tracker: BandTracker,
    renderer: Renderer,
}

impl Monitor {
    pub fn new(deps: MonitorDeps) -> Self {
        let board = Board::new(&deps.coins);
        let tracker = BandTracker::new(deps.delta_threshold);
        let renderer = Renderer::new(deps.delta_threshold, deps.exchanges.clone());
        Self {
            feeds: deps.feeds,
            coins: deps.coins,
            exchanges: deps.exchanges,
            print_every_min: deps.print_every_min,
            delta_threshold: deps.delta_threshold,
            sink: deps.sink,
            repo: deps.repo,
            executor: deps.executor,
            board,
            tracker,
            renderer,
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.feeds.is_empty() {
            bail!("no feeds");
        }

        info!(
            exchanges = ?self.exchanges,
            coins = ?self.coins,
            feeds = self.feeds.len(),
            delta_threshold = self.delta_threshold,
            "✓ monitor started"
        );

        let mut merged = merge_feeds(&self.feeds, &shutdown, &self.coins)?;

        let period = Duration::from_secs(self.print_every_min.max(1) as u64 * 60);
        let mut snap_ticker = interval_at(Instant::now() + period, period);
        snap_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.sink
            .write_live(&self.renderer.render(&self.board.snapshot(), RenderMode::Live));

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    self.sink.newline();
                    return Ok(());
                }
                _ = snap_ticker.tick() => {
                    self.emit_snapshot().await;
                }
                tick = merged.recv() => {
                    // merged closes only after every feed shut down
                    let Some(tick) = tick else {
                        self.sink.newline();
                        return Ok(());
                    };
                    self.handle_tick(tick).await;
                }
            }
        }
    }

    async fn emit_snapshot(&self) {
        let now = Utc::now();
        let line = self
            .renderer
            .render(&self.board.snapshot(), RenderMode::Snapshot);
        self.sink.write_snapshot(now, &line);
        if let Err(e) = self
            .repo
            .insert_snapshot(now.timestamp_millis(), &line)
            .await
        {
            warn!(error = %e, "snapshot persist failed");
        }
    }

    async fn handle_tick(&mut self, tick: Tick) {
        let changed = self.board.apply(&tick);
        if changed {
            let line = self
                .renderer
                .render(&self.board.snapshot(), RenderMode::Live);
            self.sink.write_live(&line);
        }

        if let Some(px) = tick.price_num {
            if px > 0.0 {
                if let Err(e) = self
                    .repo
                    .upsert_latest_price(&tick.exchange, &tick.coin, px, tick.ts_ms)
                    .await
                {
                    warn!(error = %e, "latest price persist failed");
                }
            }
        }

        if !changed {
            return;
        }

        let Some((delta, band)) =
            self.board
                .delta_band(&tick.coin, &self.exchanges, self.delta_threshold)
        else {
            return;
        };

        let board = &self.board;
        let renderer = &self.renderer;
        let signal = self.tracker.observe(&tick.coin, delta, band, || {
            renderer.render(&board.snapshot(), RenderMode::Snapshot)
        });

        if let Some(signal) = signal {
            self.emit_signal(&signal).await;
        }
    }

    async fn emit_signal(&self, signal: &Signal) {
        self.sink.newline();
        warn!(
            coin = %signal.coin,
            delta = signal.delta,
            band = signal.band,
            threshold = signal.threshold,
            "{}",
            signal.payload
        );

        if let Err(e) = self
            .repo
            .insert_signal(
                Utc::now().timestamp_millis(),
                &signal.coin,
                signal.delta,
                &signal.payload,
            )
            .await
        {
            warn!(error = %e, "signal persist failed");
        }

        if self.executor.is_some() {
            self.execute_signal(signal).await;
        }
    }

    /// Run the stub execution path for a signal: analyze the first two
    /// priced display exchanges and place paper legs when the spread clears
    /// costs.
    async fn execute_signal(&self, signal: &Signal) {
        let Some(executor) = &self.executor else {
            return;
        };

        let snap = self.board.snapshot();
        let Some(row) = snap.rows.get(&signal.coin) else {
            return;
        };

        let mut legs: Vec<(String, f64)> = Vec::with_capacity(2);
        for ex in &self.exchanges {
            if let Some(cell) = row.exchanges.get(ex) {
                if cell.parsed && cell.has_num {
                    legs.push((ex.clone(), cell.num));
                    if legs.len() == 2 {
                        break;
                    }
                }
            }
        }
        if legs.len() < 2 {
            warn!(coin = %signal.coin, "insufficient price data for execution");
            return;
        }

        let analysis = executor.analyzer.analyze(
            &signal.coin,
            &legs[0].0,
            legs[0].1,
            &legs[1].0,
            legs[1].1,
            executor.orders.default_quantity,
        );
        if !analysis.is_opportunity {
            info!(coin = %signal.coin, reason = %analysis.reason, "spread not executable");
            return;
        }

        match executor.orders.execute_spread(&analysis).await {
            Ok(exec) => info!(
                coin = %exec.coin,
                buy = %exec.buy_exchange,
                sell = %exec.sell_exchange,
                buy_order_id = %exec.buy_order_id,
                sell_order_id = %exec.sell_order_id,
                quantity = exec.quantity,
                expected_profit = exec.expected_profit_usd,
                "✓ arbitrage order executed"
            ),
            Err(e) => error!(coin = %signal.coin, error = %e, "arbitrage execution failed"),
        }
    }
}
