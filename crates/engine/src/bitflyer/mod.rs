pub mod rest;
pub mod stream;

pub use rest::BitflyerClient;
pub use stream::BitflyerStream;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use common::Ticker;

/// Ticker payload shared by the REST endpoint and the realtime channel.
#[derive(Debug, Deserialize)]
pub(crate) struct TickerMessage {
    product_code: String,
    timestamp: String,
    best_bid: f64,
    best_ask: f64,
    #[serde(default)]
    volume: f64,
}

impl TickerMessage {
    pub(crate) fn into_ticker(self) -> Option<Ticker> {
        Some(Ticker {
            time: parse_exchange_time(&self.timestamp)?,
            product_code: self.product_code,
            best_bid: self.best_bid,
            best_ask: self.best_ask,
            volume: self.volume,
        })
    }
}

/// Exchange timestamps are UTC but do not always carry a zone suffix.
pub(crate) fn parse_exchange_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zoned_and_naive_timestamps() {
        let zoned = parse_exchange_time("2024-03-01T10:17:42.123Z").unwrap();
        let naive = parse_exchange_time("2024-03-01T10:17:42.123").unwrap();
        assert_eq!(zoned, naive);
        assert!(parse_exchange_time("yesterday").is_none());
    }

    #[test]
    fn ticker_message_converts() {
        let raw = r#"{
            "product_code": "BTC_USD",
            "state": "RUNNING",
            "timestamp": "2024-03-01T10:17:42.5",
            "tick_id": 42,
            "best_bid": 100.0,
            "best_ask": 102.0,
            "volume": 1234.5
        }"#;
        let msg: TickerMessage = serde_json::from_str(raw).unwrap();
        let ticker = msg.into_ticker().unwrap();
        assert_eq!(ticker.product_code, "BTC_USD");
        assert_eq!(ticker.mid_price(), 101.0);
        assert_eq!(ticker.volume, 1234.5);
    }
}
