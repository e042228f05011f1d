use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{CandleStore, Config, ExchangeClient, SignalStore, Ticker, TradingConfig, TradingMode};
use engine::{BitflyerClient, BitflyerStream, CandleAggregator, Calibrator, Engine, Trader, TraderConfig};
use paper::PaperClient;
use store::SqliteStore;
use strategy::{Optimizer, ParamsHandle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("invalid environment")?;
    let trading = TradingConfig::load(&cfg.trading_config_path).context("invalid trading config")?;
    info!(
        mode = %cfg.trading_mode,
        product_code = %trading.product_code,
        interval = %trading.trade_interval,
        "FlyerBot starting"
    );

    // ── Database ──────────────────────────────────────────────────────────────
    let db = Arc::new(
        SqliteStore::connect(&cfg.database_url)
            .await
            .with_context(|| format!("failed to open database {}", cfg.database_url))?,
    );
    let candles: Arc<dyn CandleStore> = db.clone();
    let signals: Arc<dyn SignalStore> = db.clone();
    info!("Database ready");

    // ── Tick stream ───────────────────────────────────────────────────────────
    let (ticker_tx, _) = broadcast::channel::<Ticker>(1024);
    let stream = BitflyerStream::new(trading.product_code.clone(), ticker_tx.clone());

    // ── Exchange client (injected based on TRADING_MODE) ──────────────────────
    let exchange: Arc<dyn ExchangeClient> = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode, using BitflyerClient");
            Arc::new(BitflyerClient::new(&cfg.bitflyer_api_key, &cfg.bitflyer_secret)?)
        }
        TradingMode::Paper => {
            info!(
                balance = cfg.paper_balance,
                slippage_bps = cfg.paper_slippage_bps,
                "Paper trading mode, using PaperClient"
            );
            let paper = Arc::new(PaperClient::new(
                &trading.product_code,
                cfg.paper_balance,
                cfg.paper_slippage_bps,
            ));
            // fills need the latest top of book
            let feed = paper.clone();
            let mut ticks = ticker_tx.subscribe();
            tokio::spawn(async move {
                loop {
                    match ticks.recv().await {
                        Ok(ticker) => feed.update_price(&ticker).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Paper price feed lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            paper
        }
    };

    // ── Calibration ───────────────────────────────────────────────────────────
    let params = ParamsHandle::new();
    let calibrator = Arc::new(Calibrator::new(
        trading.product_code.clone(),
        trading.trade_interval,
        trading.data_limit,
        Optimizer::new(trading.num_ranking),
        candles.clone(),
        params.clone(),
    ));

    // ── Trader + engine ───────────────────────────────────────────────────────
    let trader = Trader::load(
        TraderConfig::from(&trading),
        exchange,
        candles.clone(),
        signals.clone(),
        params.clone(),
    )
    .await?
    .with_calibrator(calibrator.clone());
    let aggregator = CandleAggregator::new(
        trading.product_code.clone(),
        trading.intervals.clone(),
        candles.clone(),
    );
    let engine = Engine::new(aggregator, Arc::new(trader));

    // ── Chart API ─────────────────────────────────────────────────────────────
    let api_state = api::AppState {
        candles,
        signals,
        params,
        trading_mode: cfg.trading_mode,
    };

    // ── Spawn all tasks ───────────────────────────────────────────────────────
    tokio::spawn(engine.run(ticker_tx.subscribe()));
    tokio::spawn(stream.run());
    calibrator.spawn_recalibration();
    let port = cfg.api_port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_state, port).await {
            warn!(error = %e, "Chart API stopped");
        }
    });

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting.");
    Ok(())
}
