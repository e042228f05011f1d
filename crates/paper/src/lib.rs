use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use common::{
    Balance, Error, ExchangeClient, OrderAcceptance, OrderRequest, OrderSide, OrderState,
    OrderStatus, Result, Ticker,
};

/// Simulated exchange client for paper trading.
///
/// Market orders fill immediately against the latest known ticker with
/// configurable slippage. No real orders are ever sent to bitFlyer.
pub struct PaperClient {
    coin_code: String,
    currency_code: String,
    /// Simulated balances keyed by currency code.
    balances: Arc<RwLock<HashMap<String, f64>>>,
    /// Latest ticker per product, updated via `update_price`.
    tickers: Arc<RwLock<HashMap<String, Ticker>>>,
    /// Filled orders keyed by acceptance id.
    orders: Arc<RwLock<HashMap<String, OrderStatus>>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
}

impl PaperClient {
    /// `product_code` is `BASE_QUOTE`; the quote currency starts at
    /// `initial_balance`, the base currency at zero.
    pub fn new(product_code: &str, initial_balance: f64, slippage_bps: f64) -> Self {
        let (coin, currency) = product_code.split_once('_').unwrap_or((product_code, ""));
        info!(
            product_code,
            balance = initial_balance,
            slippage_bps,
            "PaperClient initialized"
        );
        let balances = HashMap::from([
            (coin.to_string(), 0.0),
            (currency.to_string(), initial_balance),
        ]);
        Self {
            coin_code: coin.to_string(),
            currency_code: currency.to_string(),
            balances: Arc::new(RwLock::new(balances)),
            tickers: Arc::new(RwLock::new(HashMap::new())),
            orders: Arc::new(RwLock::new(HashMap::new())),
            slippage_bps,
        }
    }

    /// Record the latest ticker for its product (called by the tick feed).
    pub async fn update_price(&self, ticker: &Ticker) {
        self.tickers
            .write()
            .await
            .insert(ticker.product_code.clone(), ticker.clone());
    }

    fn fill_price(&self, side: OrderSide, ticker: &Ticker) -> f64 {
        let slip = self.slippage_bps / 10_000.0;
        match side {
            OrderSide::Buy => ticker.best_ask * (1.0 + slip),
            OrderSide::Sell => ticker.best_bid * (1.0 - slip),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn balances(&self) -> Result<Vec<Balance>> {
        let balances = self.balances.read().await;
        let mut out: Vec<Balance> = balances
            .iter()
            .map(|(code, available)| Balance {
                currency_code: code.clone(),
                available: *available,
            })
            .collect();
        out.sort_by(|a, b| a.currency_code.cmp(&b.currency_code));
        Ok(out)
    }

    async fn ticker(&self, product_code: &str) -> Result<Ticker> {
        self.tickers
            .read()
            .await
            .get(product_code)
            .cloned()
            .ok_or_else(|| Error::Exchange(format!("No price available for {product_code}")))
    }

    async fn send_order(&self, order: &OrderRequest) -> Result<OrderAcceptance> {
        let ticker = self.ticker(&order.product_code).await?;
        let price = self.fill_price(order.side, &ticker);
        let cost = price * order.size;

        let mut balances = self.balances.write().await;
        let coin = balances.get(&self.coin_code).copied().unwrap_or(0.0);
        let currency = balances.get(&self.currency_code).copied().unwrap_or(0.0);

        let (new_coin, new_currency) = match order.side {
            OrderSide::Buy if cost <= currency => (coin + order.size, currency - cost),
            OrderSide::Sell if order.size <= coin => (coin - order.size, currency + cost),
            _ => {
                info!(side = %order.side, size = order.size, coin, currency, "Paper order refused, insufficient funds");
                return Ok(OrderAcceptance {
                    acceptance_id: String::new(),
                });
            }
        };
        balances.insert(self.coin_code.clone(), new_coin);
        balances.insert(self.currency_code.clone(), new_currency);
        drop(balances);

        let acceptance_id = format!("PAPER-{}", Uuid::new_v4());
        debug!(
            %acceptance_id,
            side = %order.side,
            price,
            size = order.size,
            "Paper fill simulated"
        );
        self.orders.write().await.insert(
            acceptance_id.clone(),
            OrderStatus {
                side: order.side,
                state: OrderState::Completed,
                average_price: price,
                size: order.size,
            },
        );

        Ok(OrderAcceptance { acceptance_id })
    }

    async fn list_orders(
        &self,
        _product_code: &str,
        acceptance_id: &str,
    ) -> Result<Vec<OrderStatus>> {
        Ok(self
            .orders
            .read()
            .await
            .get(acceptance_id)
            .cloned()
            .into_iter()
            .collect())
    }
}
