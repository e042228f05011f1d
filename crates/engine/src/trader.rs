use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use common::{
    Candle, CandleStore, ExchangeClient, Interval, OrderRequest, OrderSide, Result,
    SignalStore, TradeSignalEvent, TradingConfig,
};
use strategy::{DataFrame, ParamsHandle, PositionLedger, VotingEngine};

use crate::calibration::Calibrator;
use crate::confirm::{ConfirmPolicy, ConfirmState, OrderConfirmation};
use crate::session::{SessionState, TradeSession};

/// Order sizes are floored to this many decimal places.
const SIZE_SCALE: f64 = 10_000.0;

/// Reserve the fee share of `size` and floor the rest to four decimals.
pub fn adjust_size(size: f64, fee_fraction: f64) -> f64 {
    let size = size - size * fee_fraction;
    (size * SIZE_SCALE).floor() / SIZE_SCALE
}

#[derive(Debug, Clone)]
pub struct TraderConfig {
    pub product_code: String,
    pub coin_code: String,
    pub currency_code: String,
    pub interval: Interval,
    pub use_percent: f64,
    pub data_limit: usize,
    pub stop_limit_percent: f64,
    pub minute_to_expire: u32,
    pub fee_fraction: f64,
}

impl From<&TradingConfig> for TraderConfig {
    fn from(cfg: &TradingConfig) -> Self {
        Self {
            product_code: cfg.product_code.clone(),
            coin_code: cfg.coin_code().to_string(),
            currency_code: cfg.currency_code().to_string(),
            interval: cfg.trade_interval,
            use_percent: cfg.use_percent,
            data_limit: cfg.data_limit,
            stop_limit_percent: cfg.stop_limit_percent,
            minute_to_expire: cfg.minute_to_expire,
            fee_fraction: cfg.fee_fraction,
        }
    }
}

/// What one trade session did.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Another session was running; this trigger was dropped.
    Busy,
    /// No parameter set is active.
    Idle,
    /// The outcome of every decision the voting produced.
    Ran(Vec<Execution>),
}

/// What became of a single buy or sell decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// The candle predates this process.
    Stale,
    /// The ledger does not allow this side at this time.
    NotPermitted,
    /// Nothing to trade, or the exchange refused the order.
    Rejected,
    /// An exchange call failed before an order was accepted.
    Failed(String),
    Confirmed(TradeSignalEvent),
    /// The order was accepted but never confirmed complete.
    Unconfirmed(ConfirmState),
}

impl Execution {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Execution::Confirmed(_))
    }
}

/// Turns closed candles into orders. One session runs at a time.
pub struct Trader {
    config: TraderConfig,
    exchange: Arc<dyn ExchangeClient>,
    candles: Arc<dyn CandleStore>,
    signals: Arc<dyn SignalStore>,
    params: ParamsHandle,
    calibrator: Option<Arc<Calibrator>>,
    session: TradeSession,
    start_time: DateTime<Utc>,
    confirm_policy: ConfirmPolicy,
}

impl Trader {
    /// Build a trader whose ledger continues from the newest stored signal.
    pub async fn load(
        config: TraderConfig,
        exchange: Arc<dyn ExchangeClient>,
        candles: Arc<dyn CandleStore>,
        signals: Arc<dyn SignalStore>,
        params: ParamsHandle,
    ) -> Result<Self> {
        let seed = signals.latest_signals(&config.product_code, 1).await?;
        if let Some(last) = seed.last() {
            info!(side = %last.side, time = %last.time, "Resuming from stored signal");
        }
        let state = SessionState {
            ledger: PositionLedger::from_events(seed),
            stop_loss_price: None,
        };
        Ok(Self {
            config,
            exchange,
            candles,
            signals,
            params,
            calibrator: None,
            session: TradeSession::new(state),
            start_time: Utc::now(),
            confirm_policy: ConfirmPolicy::default(),
        })
    }

    /// Recalibrate through this after every completed sell.
    pub fn with_calibrator(mut self, calibrator: Arc<Calibrator>) -> Self {
        self.calibrator = Some(calibrator);
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_confirm_policy(mut self, policy: ConfirmPolicy) -> Self {
        self.confirm_policy = policy;
        self
    }

    pub fn config(&self) -> &TraderConfig {
        &self.config
    }

    pub fn session(&self) -> &TradeSession {
        &self.session
    }

    /// Run one trade session for a closed trade-interval candle.
    pub async fn on_candle_closed(&self, closed: &Candle) -> Result<SessionOutcome> {
        let Some(mut active) = self.session.try_begin().await else {
            warn!(candle = %closed.time, "Trade session already running, skipping candle");
            return Ok(SessionOutcome::Busy);
        };
        let Some(params) = self.params.current().await else {
            debug!(candle = %closed.time, "No active parameters");
            return Ok(SessionOutcome::Idle);
        };

        // the store also holds the candle that just opened
        let mut candles = self
            .candles
            .latest_candles(&self.config.product_code, self.config.interval, self.config.data_limit + 1)
            .await?;
        candles.retain(|c| c.time <= closed.time);
        if candles.len() > self.config.data_limit {
            let excess = candles.len() - self.config.data_limit;
            candles.drain(..excess);
        }

        let df = DataFrame::new(self.config.product_code.clone(), self.config.interval, candles);
        let voting = VotingEngine::new(&params, &df);
        let mut executions = Vec::new();

        for i in 1..df.len() {
            let Some(side) = voting.decide(&df, i, active.state.stop_loss_price) else {
                continue;
            };
            let candle = &df.candles[i];
            let execution = self.execute(&mut active.state, side, candle).await;
            let confirmed = execution.is_confirmed();
            executions.push(execution);
            if !confirmed {
                continue;
            }

            match side {
                OrderSide::Buy => {
                    let stop = candle.close * self.config.stop_limit_percent;
                    info!(stop_loss = stop, "Stop loss set");
                    active.state.stop_loss_price = Some(stop);
                }
                OrderSide::Sell => {
                    active.state.stop_loss_price = None;
                    if let Some(calibrator) = &self.calibrator {
                        calibrator.spawn_recalibration();
                    }
                }
            }
        }

        Ok(SessionOutcome::Ran(executions))
    }

    /// Validate, size, place and confirm one order for `candle`.
    pub async fn execute(&self, state: &mut SessionState, side: OrderSide, candle: &Candle) -> Execution {
        if candle.time < self.start_time {
            debug!(%side, candle = %candle.time, "Ignoring signal from before start");
            return Execution::Stale;
        }
        if !state.ledger.can_trade(side, candle.time) {
            debug!(%side, candle = %candle.time, "Position does not allow this side");
            return Execution::NotPermitted;
        }

        let size = match self.order_size(side).await {
            Ok(size) => size,
            Err(e) => {
                warn!(%side, error = %e, "Could not size order");
                return Execution::Failed(e.to_string());
            }
        };
        if size <= 0.0 {
            info!(%side, "Order size rounds to zero");
            return Execution::Rejected;
        }

        let order = OrderRequest::market(
            self.config.product_code.clone(),
            side,
            size,
            self.config.minute_to_expire,
        );
        let acceptance = match self.exchange.send_order(&order).await {
            Ok(acceptance) => acceptance,
            Err(e) => {
                warn!(%side, size, error = %e, "Order submission failed");
                return Execution::Failed(e.to_string());
            }
        };
        if !acceptance.is_accepted() {
            info!(%side, size, "Order not accepted, insufficient funds?");
            return Execution::Rejected;
        }
        info!(%side, size, acceptance_id = %acceptance.acceptance_id, "Order accepted");

        let state_after = OrderConfirmation::new(
            self.exchange.as_ref(),
            &self.config.product_code,
            &acceptance.acceptance_id,
            candle.time,
            self.confirm_policy,
        )
        .wait(&mut state.ledger)
        .await;

        match state_after {
            ConfirmState::Completed(event) => {
                match self.signals.insert_signal(&event).await {
                    Ok(true) => {}
                    Ok(false) => debug!(time = %event.time, "Signal already stored"),
                    Err(e) => warn!(error = %e, "Failed to persist signal"),
                }
                Execution::Confirmed(event)
            }
            other => Execution::Unconfirmed(other),
        }
    }

    async fn order_size(&self, side: OrderSide) -> Result<f64> {
        let raw = match side {
            OrderSide::Buy => {
                let available = self.available(&self.config.currency_code).await?;
                let ticker = self.exchange.ticker(&self.config.product_code).await?;
                if ticker.best_ask <= 0.0 {
                    return Ok(0.0);
                }
                available * self.config.use_percent / ticker.best_ask
            }
            OrderSide::Sell => self.available(&self.config.coin_code).await?,
        };
        Ok(adjust_size(raw, self.config.fee_fraction))
    }

    async fn available(&self, currency_code: &str) -> Result<f64> {
        let balances = self.exchange.balances().await?;
        Ok(balances
            .iter()
            .find(|b| b.currency_code == currency_code)
            .map(|b| b.available)
            .unwrap_or(0.0))
    }
}
