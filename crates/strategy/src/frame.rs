use serde::Serialize;

use common::{Candle, Interval};

use crate::indicators::{self, Bands, Ichimoku, Macd};
use crate::ledger::PositionLedger;

/// An indicator series tagged with the period it was computed for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSeries {
    pub period: usize,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandsSeries {
    pub n: usize,
    pub k: f64,
    #[serde(flatten)]
    pub bands: Bands,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacdSeries {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    #[serde(flatten)]
    pub lines: Macd,
}

/// Ordered candle series for one product and interval, plus any indicator
/// series attached for charting.
#[derive(Debug, Clone, Serialize)]
pub struct DataFrame {
    pub product_code: String,
    pub interval: Interval,
    pub candles: Vec<Candle>,
    #[serde(skip)]
    closes: Vec<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub smas: Vec<PeriodSeries>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub emas: Vec<PeriodSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbands: Option<BandsSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ichimoku: Option<Ichimoku>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi: Option<PeriodSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd: Option<MacdSeries>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hvs: Vec<PeriodSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<PositionLedger>,
}

impl DataFrame {
    pub fn new(product_code: impl Into<String>, interval: Interval, candles: Vec<Candle>) -> Self {
        let closes = candles.iter().map(|c| c.close).collect();
        Self {
            product_code: product_code.into(),
            interval,
            candles,
            closes,
            smas: Vec::new(),
            emas: Vec::new(),
            bbands: None,
            ichimoku: None,
            rsi: None,
            macd: None,
            hvs: Vec::new(),
            events: None,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn volume(&self, i: usize) -> f64 {
        self.candles.get(i).map_or(0.0, |c| c.volume)
    }

    // ─── Chart attachments ───────────────────────────────────────────────────

    pub fn add_sma(&mut self, period: usize) -> bool {
        if period == 0 || self.len() <= period {
            return false;
        }
        self.smas.push(PeriodSeries {
            period,
            values: indicators::sma(&self.closes, period),
        });
        true
    }

    pub fn add_ema(&mut self, period: usize) -> bool {
        if period == 0 || self.len() <= period {
            return false;
        }
        self.emas.push(PeriodSeries {
            period,
            values: indicators::ema(&self.closes, period),
        });
        true
    }

    pub fn add_bbands(&mut self, n: usize, k: f64) -> bool {
        if n == 0 || n > self.len() {
            return false;
        }
        self.bbands = Some(BandsSeries {
            n,
            k,
            bands: indicators::bbands(&self.closes, n, k),
        });
        true
    }

    pub fn add_ichimoku(&mut self) -> bool {
        if self.len() < 9 {
            return false;
        }
        self.ichimoku = Some(indicators::ichimoku(&self.closes));
        true
    }

    pub fn add_rsi(&mut self, period: usize) -> bool {
        if period == 0 || self.len() <= period {
            return false;
        }
        self.rsi = Some(PeriodSeries {
            period,
            values: indicators::rsi(&self.closes, period),
        });
        true
    }

    pub fn add_macd(&mut self, fast: usize, slow: usize, signal: usize) -> bool {
        if self.len() <= 1 {
            return false;
        }
        self.macd = Some(MacdSeries {
            fast_period: fast,
            slow_period: slow,
            signal_period: signal,
            lines: indicators::macd(&self.closes, fast, slow, signal),
        });
        true
    }

    pub fn add_hv(&mut self, period: usize) -> bool {
        if period == 0 || self.len() < period {
            return false;
        }
        self.hvs.push(PeriodSeries {
            period,
            values: indicators::historical_volatility(&self.closes, period),
        });
        true
    }

    /// Attach the events recorded since the first candle of the frame.
    pub fn attach_events(&mut self, ledger: PositionLedger) -> bool {
        let Some(first) = self.candles.first() else {
            return false;
        };
        let recent = ledger.get_after(first.time).to_vec();
        if recent.is_empty() {
            return false;
        }
        self.events = Some(PositionLedger::from_events(recent));
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    pub(crate) fn minute(i: usize) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(i as i64)
    }

    /// One-minute candles with open/high/low equal to close and the given volume.
    pub(crate) fn frame_from_closes(closes: &[f64], volume: f64) -> DataFrame {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::open_at("BTC_USD", Interval::OneMinute, minute(i), c, volume))
            .collect();
        DataFrame::new("BTC_USD", Interval::OneMinute, candles)
    }

    #[test]
    fn attachments_respect_minimum_lengths() {
        let mut df = frame_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0], 1.0);
        assert!(df.add_sma(3));
        assert!(!df.add_sma(5));
        assert!(df.add_bbands(5, 2.0));
        assert!(!df.add_ichimoku());
        assert!(!df.add_rsi(5));
        assert!(df.add_macd(12, 26, 9));
        assert!(df.add_hv(5));
        assert_eq!(df.smas.len(), 1);
        assert_eq!(df.smas[0].values.len(), 5);
    }

    #[test]
    fn serialized_frame_omits_empty_attachments() {
        let mut df = frame_from_closes(&[1.0, 2.0, 3.0], 1.0);
        df.add_ema(2);
        let json = serde_json::to_value(&df).unwrap();
        assert_eq!(json["candles"].as_array().unwrap().len(), 3);
        assert!(json.get("smas").is_none());
        assert_eq!(json["emas"][0]["period"], 2);
        assert!(json.get("closes").is_none());
    }

    #[test]
    fn attach_events_keeps_recent_only() {
        let df_closes = [10.0, 11.0, 12.0];
        let mut df = frame_from_closes(&df_closes, 1.0);
        let mut ledger = PositionLedger::new();
        assert!(!df.attach_events(ledger.clone()));

        ledger.buy("BTC_USD", minute(0) - Duration::minutes(10), 9.0, 1.0);
        ledger.sell("BTC_USD", minute(1), 11.0, 1.0);
        assert!(df.attach_events(ledger));
        assert_eq!(df.events.as_ref().unwrap().len(), 1);
    }
}
