use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xarb::config::Config;
use xarb::execution::analyzer::SpreadAnalyzer;
use xarb::execution::OrderManager;
use xarb::feeds::binance::BinanceFeed;
use xarb::feeds::bitget::BitgetFeed;
use xarb::feeds::bybit::BybitFeed;
use xarb::feeds::okx::OkxFeed;
use xarb::feeds::PriceFeed;
use xarb::monitor::{Executor, Monitor, MonitorDeps};
use xarb::sink::ConsoleSink;
use xarb::storage::postgres::PostgresRepository;
use xarb::storage::redis::RedisRepository;
use xarb::storage::sqlite::SqliteRepository;
use xarb::storage::{CompositeRepository, NoopRepository, Repository};
use xarb::symbol::SymbolConverter;

const KNOWN_EXCHANGES: [&str; 4] = ["binance", "bybit", "okx", "bitget"];

#[derive(Parser, Debug)]
#[command(name = "xarb")]
#[command(about = "Cross-exchange perpetual price monitor and arbitrage signals")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "configs/config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    let exchanges = cfg.enabled_exchanges();
    let feeds = build_feeds(&cfg)?;
    if feeds.is_empty() {
        bail!("no exchange feeds enabled");
    }

    let repo = build_repository(&cfg).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown().await;
        warn!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    info!(
        config = %args.config,
        coins = cfg.symbols.list.len(),
        print_every_min = cfg.app.print_every_min,
        delta_threshold = cfg.arbitrage.delta_threshold,
        "xarb started"
    );

    let monitor = Monitor::new(MonitorDeps {
        feeds,
        coins: cfg.symbols.list.clone(),
        exchanges: exchanges.clone(),
        print_every_min: cfg.app.print_every_min,
        delta_threshold: cfg.arbitrage.delta_threshold,
        sink: Box::new(ConsoleSink::new()),
        repo: repo.clone(),
        executor: Some(Executor {
            analyzer: SpreadAnalyzer::default(),
            orders: OrderManager::paper(&exchanges),
        }),
    });

    let result = monitor.run(shutdown_rx).await;

    if let Err(e) = repo.close().await {
        warn!(error = %e, "repository close failed");
    }
    warn!("exit");
    result
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xarb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// One feed per enabled exchange, each with its own symbol converter. No
/// registry: everything is wired here, once, at startup.
fn build_feeds(cfg: &Config) -> Result<Vec<Box<dyn PriceFeed>>> {
    let quote = &cfg.symbols.quote;
    let mut feeds: Vec<Box<dyn PriceFeed>> = Vec::new();

    for name in KNOWN_EXCHANGES {
        let Some(ex) = cfg.exchanges.get(name) else {
            continue;
        };
        if !ex.enabled {
            warn!(exchange = name, "disabled by config");
            continue;
        }
        let url = ex.perpetual_ws_url.as_str();
        match name {
            "binance" => {
                feeds.push(Box::new(BinanceFeed::new(url, SymbolConverter::with_quote(quote))))
            }
            "bybit" => {
                feeds.push(Box::new(BybitFeed::new(url, SymbolConverter::with_quote(quote))))
            }
            "okx" => {
                feeds.push(Box::new(OkxFeed::new(url, SymbolConverter::okx_perpetual(quote))))
            }
            "bitget" => feeds.push(Box::new(BitgetFeed::perpetual(
                url,
                SymbolConverter::with_quote(quote),
            ))),
            _ => unreachable!(),
        }
    }

    for (name, ex) in &cfg.exchanges {
        if ex.enabled && !KNOWN_EXCHANGES.contains(&name.as_str()) {
            warn!(exchange = %name, "no feed implementation, ignored");
        }
    }

    Ok(feeds)
}

/// Composite of every enabled backend; noop when none is. Backends close in
/// reverse registration order on shutdown.
async fn build_repository(cfg: &Config) -> Result<Arc<dyn Repository>> {
    let mut repos: Vec<Box<dyn Repository>> = Vec::new();

    if cfg.redis.enabled {
        repos.push(Box::new(
            RedisRepository::connect(&cfg.redis)
                .await
                .context("redis repo init")?,
        ));
    }
    if cfg.sqlite.enabled {
        repos.push(Box::new(
            SqliteRepository::open(&cfg.sqlite.path).context("sqlite repo init")?,
        ));
    }
    if cfg.postgres.enabled {
        repos.push(Box::new(
            PostgresRepository::connect(&cfg.postgres.dsn)
                .await
                .context("postgres repo init")?,
        ));
    }

    if repos.is_empty() {
        Ok(Arc::new(NoopRepository))
    } else {
        Ok(Arc::new(CompositeRepository::new(repos)))
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut term) = signal(SignalKind::terminate()) else {
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
