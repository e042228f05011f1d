use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::frame::DataFrame;
use crate::rules::{BollingerBreakout, EmaCross, IchimokuBreakout, MacdCross, RsiThreshold, Strategy};

/// Cloud line windows; a cloud backtest needs more candles than the longest.
pub const ICHIMOKU_MIN_CANDLES: usize = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Ema,
    Bollinger,
    Macd,
    Ichimoku,
    Rsi,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Ema => write!(f, "ema"),
            StrategyKind::Bollinger => write!(f, "bbands"),
            StrategyKind::Macd => write!(f, "macd"),
            StrategyKind::Ichimoku => write!(f, "ichimoku"),
            StrategyKind::Rsi => write!(f, "rsi"),
        }
    }
}

/// Tuned parameters for one strategy kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyParams {
    Ema {
        short_period: usize,
        long_period: usize,
    },
    Bollinger {
        n: usize,
        k: f64,
    },
    Macd {
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    },
    Ichimoku,
    Rsi {
        period: usize,
        buy_threshold: f64,
        sell_threshold: f64,
    },
}

impl StrategyParams {
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyParams::Ema { .. } => StrategyKind::Ema,
            StrategyParams::Bollinger { .. } => StrategyKind::Bollinger,
            StrategyParams::Macd { .. } => StrategyKind::Macd,
            StrategyParams::Ichimoku => StrategyKind::Ichimoku,
            StrategyParams::Rsi { .. } => StrategyKind::Rsi,
        }
    }

    /// A backtest needs strictly more candles than this.
    pub fn min_candles(&self) -> usize {
        match *self {
            StrategyParams::Ema {
                short_period,
                long_period,
            } => short_period.max(long_period),
            StrategyParams::Bollinger { n, .. } => n,
            StrategyParams::Macd {
                fast_period,
                slow_period,
                signal_period,
            } => fast_period.max(slow_period).max(signal_period),
            StrategyParams::Ichimoku => ICHIMOKU_MIN_CANDLES,
            StrategyParams::Rsi { period, .. } => period,
        }
    }

    /// Compute the indicator series this strategy needs over `df`.
    pub fn build(&self, df: &DataFrame) -> Box<dyn Strategy> {
        match *self {
            StrategyParams::Ema {
                short_period,
                long_period,
            } => Box::new(EmaCross::new(df, short_period, long_period)),
            StrategyParams::Bollinger { n, k } => Box::new(BollingerBreakout::new(df, n, k)),
            StrategyParams::Macd {
                fast_period,
                slow_period,
                signal_period,
            } => Box::new(MacdCross::new(df, fast_period, slow_period, signal_period)),
            StrategyParams::Ichimoku => Box::new(IchimokuBreakout::new(df)),
            StrategyParams::Rsi {
                period,
                buy_threshold,
                sell_threshold,
            } => Box::new(RsiThreshold::new(df, period, buy_threshold, sell_threshold)),
        }
    }
}

/// Best parameters found for one kind, whether it may vote, and the
/// backtest profit that decided it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySlot {
    pub enabled: bool,
    pub profit: f64,
    pub params: StrategyParams,
}

/// The active parameter set, one slot per strategy kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeParams {
    pub strategies: Vec<StrategySlot>,
}

impl TradeParams {
    pub fn enabled(&self) -> impl Iterator<Item = &StrategyParams> {
        self.strategies
            .iter()
            .filter(|s| s.enabled)
            .map(|s| &s.params)
    }

    pub fn slot(&self, kind: StrategyKind) -> Option<&StrategySlot> {
        self.strategies.iter().find(|s| s.params.kind() == kind)
    }
}

/// Shared, atomically swapped parameter set. `None` means calibration has not
/// produced anything worth trading on yet.
#[derive(Clone, Default)]
pub struct ParamsHandle {
    inner: Arc<RwLock<Option<Arc<TradeParams>>>>,
}

impl ParamsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Arc<TradeParams>> {
        self.inner.read().await.clone()
    }

    pub async fn replace(&self, params: Option<TradeParams>) {
        *self.inner.write().await = params.map(Arc::new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_candles_per_kind() {
        let ema = StrategyParams::Ema {
            short_period: 7,
            long_period: 14,
        };
        assert_eq!(ema.min_candles(), 14);
        let macd = StrategyParams::Macd {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
        };
        assert_eq!(macd.min_candles(), 26);
        assert_eq!(StrategyParams::Ichimoku.min_candles(), 52);
    }

    #[test]
    fn params_serialize_with_kind_tag() {
        let slot = StrategySlot {
            enabled: true,
            profit: 1.5,
            params: StrategyParams::Bollinger { n: 20, k: 2.0 },
        };
        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json["params"]["kind"], "bollinger");
        assert_eq!(json["params"]["n"], 20);
    }

    #[tokio::test]
    async fn handle_swaps_whole_set() {
        let handle = ParamsHandle::new();
        assert!(handle.current().await.is_none());

        let params = TradeParams {
            strategies: vec![StrategySlot {
                enabled: true,
                profit: 3.0,
                params: StrategyParams::Ichimoku,
            }],
        };
        handle.replace(Some(params.clone())).await;
        let seen = handle.current().await.unwrap();
        assert_eq!(*seen, params);
        assert_eq!(seen.enabled().count(), 1);

        handle.replace(None).await;
        assert!(handle.current().await.is_none());
        // earlier snapshot is untouched
        assert_eq!(seen.strategies.len(), 1);
    }
}
