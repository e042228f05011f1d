use tracing::debug;

use crate::backtest::backtest_profit;
use crate::frame::DataFrame;
use crate::params::{StrategyParams, StrategySlot, TradeParams};

/// Fixed RSI thresholds; only the period is searched.
pub const RSI_BUY_THRESHOLD: f64 = 30.0;
pub const RSI_SELL_THRESHOLD: f64 = 70.0;

/// Exhaustive grid search over every strategy kind.
#[derive(Debug, Clone, Copy)]
pub struct Optimizer {
    pub num_ranking: usize,
}

impl Optimizer {
    pub fn new(num_ranking: usize) -> Self {
        Self { num_ranking }
    }

    /// Best parameters per kind, with the `num_ranking` most profitable
    /// enabled. `None` when no kind made a positive profit.
    pub fn optimize(&self, df: &DataFrame) -> Option<TradeParams> {
        let results = vec![
            optimize_ema(df),
            optimize_bbands(df),
            optimize_macd(df),
            optimize_ichimoku(df),
            optimize_rsi(df),
        ];
        for (profit, params) in &results {
            debug!(kind = %params.kind(), profit, ?params, "Best parameters");
        }
        rank(results, self.num_ranking)
    }
}

/// Sort by profit (descending, stable) and enable the first `num_ranking`
/// entries that made money.
pub fn rank(results: Vec<(f64, StrategyParams)>, num_ranking: usize) -> Option<TradeParams> {
    let mut results = results;
    results.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut enabled = 0;
    let strategies: Vec<StrategySlot> = results
        .into_iter()
        .map(|(profit, params)| {
            let enable = enabled < num_ranking && profit > 0.0;
            if enable {
                enabled += 1;
            }
            StrategySlot {
                enabled: enable,
                profit,
                params,
            }
        })
        .collect();

    if enabled == 0 {
        return None;
    }
    Some(TradeParams { strategies })
}

/// Keep the first candidate with strictly greater profit than anything seen,
/// starting from zero; the seed wins when nothing beats it.
fn search(
    df: &DataFrame,
    seed: StrategyParams,
    candidates: impl IntoIterator<Item = StrategyParams>,
) -> (f64, StrategyParams) {
    let mut best = (0.0, seed);
    for params in candidates {
        if let Some(profit) = backtest_profit(df, &params) {
            if profit > best.0 {
                best = (profit, params);
            }
        }
    }
    best
}

pub fn optimize_ema(df: &DataFrame) -> (f64, StrategyParams) {
    let seed = StrategyParams::Ema {
        short_period: 7,
        long_period: 14,
    };
    let grid = (5..50).flat_map(|short_period| {
        (12..50).map(move |long_period| StrategyParams::Ema {
            short_period,
            long_period,
        })
    });
    search(df, seed, grid)
}

/// Band widths stepped by float accumulation: 1.9, 2.0.
pub fn bbands_widths() -> Vec<f64> {
    let mut widths = Vec::new();
    let mut k = 1.9;
    while k < 2.1 {
        widths.push(k);
        k += 0.1;
    }
    widths
}

pub fn optimize_bbands(df: &DataFrame) -> (f64, StrategyParams) {
    let seed = StrategyParams::Bollinger { n: 20, k: 2.0 };
    let widths = bbands_widths();
    let grid = (10..20).flat_map(|n| {
        widths
            .clone()
            .into_iter()
            .map(move |k| StrategyParams::Bollinger { n, k })
    });
    search(df, seed, grid)
}

/// The cloud has no parameters; its profit is reported as-is, losses included.
pub fn optimize_ichimoku(df: &DataFrame) -> (f64, StrategyParams) {
    let params = StrategyParams::Ichimoku;
    (backtest_profit(df, &params).unwrap_or(0.0), params)
}

pub fn optimize_macd(df: &DataFrame) -> (f64, StrategyParams) {
    let seed = StrategyParams::Macd {
        fast_period: 12,
        slow_period: 26,
        signal_period: 9,
    };
    let grid = (10..19).flat_map(|fast_period| {
        (20..30).flat_map(move |slow_period| {
            (5..15).map(move |signal_period| StrategyParams::Macd {
                fast_period,
                slow_period,
                signal_period,
            })
        })
    });
    search(df, seed, grid)
}

pub fn optimize_rsi(df: &DataFrame) -> (f64, StrategyParams) {
    let rsi = |period| StrategyParams::Rsi {
        period,
        buy_threshold: RSI_BUY_THRESHOLD,
        sell_threshold: RSI_SELL_THRESHOLD,
    };
    search(df, rsi(14), (5..25).map(rsi))
}
