use common::OrderSide;

use crate::frame::DataFrame;
use crate::ledger::PositionLedger;
use crate::params::StrategyParams;

/// Order size used for every simulated trade.
pub const BACKTEST_SIZE: f64 = 0.05;

/// Replay one strategy over every candle of `df`, trading at the close.
///
/// Returns `None` when the series is too short for the parameters.
pub fn backtest(df: &DataFrame, params: &StrategyParams) -> Option<PositionLedger> {
    if df.len() <= params.min_candles() {
        return None;
    }

    let strategy = params.build(df);
    let mut ledger = PositionLedger::new();
    for i in 1..df.len() {
        let candle = &df.candles[i];
        match strategy.signal(df, i) {
            Some(OrderSide::Buy) => {
                ledger.buy(&df.product_code, candle.time, candle.close, BACKTEST_SIZE);
            }
            Some(OrderSide::Sell) => {
                ledger.sell(&df.product_code, candle.time, candle.close, BACKTEST_SIZE);
            }
            None => {}
        }
    }
    Some(ledger)
}

/// Profit of a backtest, or `None` when it could not run.
pub fn backtest_profit(df: &DataFrame, params: &StrategyParams) -> Option<f64> {
    backtest(df, params).map(|ledger| ledger.profit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::frame_from_closes;

    #[test]
    fn too_short_series_yields_nothing() {
        let df = frame_from_closes(&[1.0; 14], 1.0);
        let params = StrategyParams::Ema {
            short_period: 7,
            long_period: 14,
        };
        assert!(backtest(&df, &params).is_none());
        assert!(backtest(&df, &StrategyParams::Ichimoku).is_none());
    }

    #[test]
    fn ema_backtest_ignores_leading_sell() {
        let df = frame_from_closes(&[10.0, 10.0, 12.0, 5.0, 20.0], 0.0);
        let params = StrategyParams::Ema {
            short_period: 1,
            long_period: 2,
        };
        let ledger = backtest(&df, &params).unwrap();
        // the sell at index 3 has nothing to close; the buy at index 4 is open
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.signals()[0].side, OrderSide::Buy);
        assert_eq!(ledger.signals()[0].price, 20.0);
        assert_eq!(ledger.signals()[0].size, BACKTEST_SIZE);
        assert_eq!(ledger.profit(), 0.0);
    }

    #[test]
    fn round_trip_profit_is_realized() {
        // golden cross at 4, dead cross at 6
        let closes = [10.0, 10.0, 12.0, 5.0, 20.0, 30.0, 8.0];
        let df = frame_from_closes(&closes, 0.0);
        let params = StrategyParams::Ema {
            short_period: 1,
            long_period: 2,
        };
        let ledger = backtest(&df, &params).unwrap();
        assert_eq!(ledger.len(), 2);
        let expected = (8.0 - 20.0) * BACKTEST_SIZE;
        assert!((ledger.profit() - expected).abs() < 1e-12);
    }
}
