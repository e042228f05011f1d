use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use common::{
    Balance, Candle, Error, ExchangeClient, Interval, OrderAcceptance, OrderRequest, OrderSide,
    OrderState, OrderStatus, Result, Ticker,
};

pub(crate) fn minute(i: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(i)
}

pub(crate) fn candle(i: i64, close: f64, volume: f64) -> Candle {
    Candle::open_at("BTC_USD", Interval::OneMinute, minute(i), close, volume)
}

/// Closes that slide 20 steps then climb back in 20, repeated. An EMA cross
/// buys each recovery and sells each slide at a profit.
pub(crate) fn swing_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| match i % 40 {
            step @ 0..=19 => 100.0 - step as f64,
            step => 80.0 + (step - 20) as f64 * 2.0,
        })
        .collect()
}

pub(crate) fn order_status(side: OrderSide, state: OrderState, price: f64, size: f64) -> OrderStatus {
    OrderStatus {
        side,
        state,
        average_price: price,
        size,
    }
}

pub(crate) enum Reply {
    Orders(Vec<OrderStatus>),
    Fail(String),
}

/// Exchange double with canned answers. The last order status reply repeats
/// once the script runs out.
pub(crate) struct ScriptedExchange {
    balances: Vec<Balance>,
    ask: f64,
    acceptance_id: String,
    replies: Mutex<VecDeque<Reply>>,
    polls: AtomicUsize,
}

impl ScriptedExchange {
    pub(crate) fn new() -> Self {
        Self {
            balances: Vec::new(),
            ask: 100.0,
            acceptance_id: "ID1".into(),
            replies: Mutex::new(VecDeque::new()),
            polls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_balance(mut self, currency_code: &str, available: f64) -> Self {
        self.balances.push(Balance {
            currency_code: currency_code.into(),
            available,
        });
        self
    }

    pub(crate) fn with_ask(mut self, ask: f64) -> Self {
        self.ask = ask;
        self
    }

    pub(crate) fn with_acceptance_id(mut self, id: &str) -> Self {
        self.acceptance_id = id.into();
        self
    }

    pub(crate) fn with_replies(self, replies: Vec<Reply>) -> Self {
        *self.replies.lock().unwrap() = replies.into();
        self
    }

    pub(crate) fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    async fn balances(&self) -> Result<Vec<Balance>> {
        Ok(self.balances.clone())
    }

    async fn ticker(&self, product_code: &str) -> Result<Ticker> {
        Ok(Ticker {
            product_code: product_code.into(),
            time: minute(0),
            best_bid: self.ask - 1.0,
            best_ask: self.ask,
            volume: 0.0,
        })
    }

    async fn send_order(&self, _order: &OrderRequest) -> Result<OrderAcceptance> {
        Ok(OrderAcceptance {
            acceptance_id: self.acceptance_id.clone(),
        })
    }

    async fn list_orders(&self, _product_code: &str, _acceptance_id: &str) -> Result<Vec<OrderStatus>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().map(|r| match r {
                Reply::Orders(orders) => Reply::Orders(orders.clone()),
                Reply::Fail(msg) => Reply::Fail(msg.clone()),
            })
        };
        match reply {
            Some(Reply::Orders(orders)) => Ok(orders),
            Some(Reply::Fail(msg)) => Err(Error::Exchange(msg)),
            None => Ok(Vec::new()),
        }
    }
}
