use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Balance, Candle, Interval, OrderAcceptance, OrderRequest, OrderStatus, Result, Ticker,
    TradeSignalEvent,
};

/// Abstraction over the exchange connection.
///
/// `BitflyerClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Available balance for every currency on the account.
    async fn balances(&self) -> Result<Vec<Balance>>;

    /// Latest top-of-book for a product.
    async fn ticker(&self, product_code: &str) -> Result<Ticker>;

    /// Submit a market order. A business rejection (e.g. insufficient funds)
    /// comes back as an acceptance with an empty id, not as an error.
    async fn send_order(&self, order: &OrderRequest) -> Result<OrderAcceptance>;

    /// Status of the orders matching an acceptance id.
    async fn list_orders(&self, product_code: &str, acceptance_id: &str)
        -> Result<Vec<OrderStatus>>;
}

/// Persistent candle history.
#[async_trait]
pub trait CandleStore: Send + Sync {
    async fn candle_at(
        &self,
        product_code: &str,
        interval: Interval,
        time: DateTime<Utc>,
    ) -> Result<Option<Candle>>;

    /// Insert or overwrite the candle at its (product, interval, time) slot.
    async fn upsert_candle(&self, candle: &Candle) -> Result<()>;

    /// The newest `limit` candles, returned oldest first.
    async fn latest_candles(
        &self,
        product_code: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>>;
}

/// Persistent trade signal history.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Returns `false` when an event already exists at that time for the
    /// product; the existing row is kept.
    async fn insert_signal(&self, event: &TradeSignalEvent) -> Result<bool>;

    /// The newest `count` events, returned oldest first.
    async fn latest_signals(&self, product_code: &str, count: usize)
        -> Result<Vec<TradeSignalEvent>>;

    /// Every event at or after `since`, oldest first.
    async fn signals_since(
        &self,
        product_code: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeSignalEvent>>;
}
