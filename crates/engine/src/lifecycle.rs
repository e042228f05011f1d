use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use common::{Interval, Result, Ticker};

use crate::candles::CandleAggregator;
use crate::trader::{SessionOutcome, Trader};

/// Drives ticks through the aggregator and hands every closed trade-interval
/// candle to the trader on its own task.
pub struct Engine {
    aggregator: CandleAggregator,
    trader: Arc<Trader>,
    trade_interval: Interval,
}

impl Engine {
    pub fn new(aggregator: CandleAggregator, trader: Arc<Trader>) -> Self {
        let trade_interval = trader.config().interval;
        Self {
            aggregator,
            trader,
            trade_interval,
        }
    }

    /// Consume ticks until the channel closes. Call from `tokio::spawn`.
    pub async fn run(mut self, mut ticks: broadcast::Receiver<Ticker>) {
        info!(interval = %self.trade_interval, "Engine running");
        loop {
            match ticks.recv().await {
                Ok(ticker) => {
                    self.handle_tick(&ticker).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Engine fell behind the tick stream");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("Tick channel closed, engine stopping");
                    return;
                }
            }
        }
    }

    /// Aggregate one tick. Returns the trade sessions it started.
    pub async fn handle_tick(&mut self, ticker: &Ticker) -> Vec<JoinHandle<Result<SessionOutcome>>> {
        let closed = match self.aggregator.ingest(ticker).await {
            Ok(closed) => closed,
            Err(e) => {
                warn!(error = %e, "Failed to aggregate tick");
                return Vec::new();
            }
        };

        closed
            .into_iter()
            .filter(|c| c.interval == self.trade_interval)
            .map(|candle| {
                let trader = Arc::clone(&self.trader);
                tokio::spawn(async move {
                    let outcome = trader.on_candle_closed(&candle).await;
                    match &outcome {
                        Ok(SessionOutcome::Ran(executions)) if !executions.is_empty() => {
                            info!(candle = %candle.time, decisions = executions.len(), "Trade session finished");
                        }
                        Ok(other) => debug!(candle = %candle.time, outcome = ?other, "Trade session finished"),
                        Err(e) => warn!(candle = %candle.time, error = %e, "Trade session failed"),
                    }
                    outcome
                })
            })
            .collect()
    }
}
