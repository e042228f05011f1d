//! Indicator series over close prices.
//!
//! Every function returns a vector with the same length as its input. Indices
//! inside an indicator's warm-up window hold `0.0`; a series too short for the
//! requested window comes back entirely zero-filled.

pub mod bbands;
pub mod ichimoku;
pub mod ma;
pub mod macd;
pub mod rsi;
pub mod volatility;

pub use bbands::{bbands, Bands};
pub use ichimoku::{ichimoku, Ichimoku};
pub use ma::{ema, sma};
pub use macd::{macd, Macd};
pub use rsi::rsi;
pub use volatility::historical_volatility;

/// Population standard deviation of a window.
pub(crate) fn std_dev(window: &[f64]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}
