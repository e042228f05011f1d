use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Candle width. Ticks are folded into one candle per interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1s")]
    OneSecond,
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "2m")]
    TwoMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
}

impl Interval {
    pub const ALL: [Interval; 7] = [
        Interval::OneSecond,
        Interval::OneMinute,
        Interval::TwoMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Interval::OneSecond => "1s",
            Interval::OneMinute => "1m",
            Interval::TwoMinutes => "2m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Interval::OneSecond => 1,
            Interval::OneMinute => 60,
            Interval::TwoMinutes => 120,
            Interval::FiveMinutes => 300,
            Interval::FifteenMinutes => 900,
            Interval::ThirtyMinutes => 1800,
            Interval::OneHour => 3600,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.seconds() as u64)
    }

    /// Start of the candle that contains `time`.
    pub fn truncate(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let secs = time.timestamp();
        let start = secs - secs.rem_euclid(self.seconds());
        Utc.timestamp_opt(start, 0).single().unwrap_or(time)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|i| i.label() == s)
            .ok_or_else(|| Error::Config(format!("unknown candle interval '{s}'")))
    }
}

/// OHLCV summary for one (product, interval, time) slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub product_code: String,
    pub interval: Interval,
    pub time: DateTime<Utc>,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

impl Candle {
    /// A fresh candle opened by a single price observation.
    pub fn open_at(
        product_code: impl Into<String>,
        interval: Interval,
        time: DateTime<Utc>,
        price: f64,
        volume: f64,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            interval,
            time,
            open: price,
            close: price,
            high: price,
            low: price,
            volume,
        }
    }

    /// Fold another price observation into this candle.
    pub fn absorb(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(Error::Other(format!("unknown order side '{other}'"))),
        }
    }
}

/// One executed (or simulated) trade decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignalEvent {
    pub time: DateTime<Utc>,
    pub product_code: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
}

/// Top-of-book snapshot pushed by the exchange stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub product_code: String,
    pub time: DateTime<Utc>,
    pub best_bid: f64,
    pub best_ask: f64,
    pub volume: f64,
}

impl Ticker {
    pub fn mid_price(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currency_code: String,
    pub available: f64,
}

/// Market order as sent to the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub product_code: String,
    pub side: OrderSide,
    pub size: f64,
    pub minute_to_expire: u32,
    pub time_in_force: String,
}

impl OrderRequest {
    pub fn market(
        product_code: impl Into<String>,
        side: OrderSide,
        size: f64,
        minute_to_expire: u32,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            side,
            size,
            minute_to_expire,
            time_in_force: "GTC".to_string(),
        }
    }
}

/// Exchange reply to an order submission. An empty id means the order was
/// not accepted (typically insufficient funds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAcceptance {
    pub acceptance_id: String,
}

impl OrderAcceptance {
    pub fn is_accepted(&self) -> bool {
        !self.acceptance_id.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderState {
    Active,
    Completed,
    Canceled,
    Expired,
    Rejected,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub side: OrderSide,
    pub state: OrderState,
    pub average_price: f64,
    pub size: f64,
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}
