use serde::Serialize;

const TENKAN_WINDOW: usize = 9;
const KIJUN_WINDOW: usize = 26;
const SENKOU_B_WINDOW: usize = 52;
const CHIKOU_SHIFT: usize = 26;

/// Ichimoku cloud computed over close prices.
///
/// Each line's window covers the candles strictly before its index, and every
/// value is stored at the index it was computed for; charting applies the
/// forward/backward displacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ichimoku {
    pub tenkan: Vec<f64>,
    pub kijun: Vec<f64>,
    pub senkou_a: Vec<f64>,
    pub senkou_b: Vec<f64>,
    pub chikou: Vec<f64>,
}

pub fn ichimoku(closes: &[f64]) -> Ichimoku {
    let len = closes.len();
    let mut cloud = Ichimoku {
        tenkan: vec![0.0; len],
        kijun: vec![0.0; len],
        senkou_a: vec![0.0; len],
        senkou_b: vec![0.0; len],
        chikou: vec![0.0; len],
    };

    for i in 0..len {
        if i >= TENKAN_WINDOW {
            cloud.tenkan[i] = midpoint(&closes[i - TENKAN_WINDOW..i]);
        }
        if i >= KIJUN_WINDOW {
            cloud.kijun[i] = midpoint(&closes[i - KIJUN_WINDOW..i]);
            cloud.senkou_a[i] = (cloud.tenkan[i] + cloud.kijun[i]) / 2.0;
            cloud.chikou[i] = closes[i - CHIKOU_SHIFT];
        }
        if i >= SENKOU_B_WINDOW {
            cloud.senkou_b[i] = midpoint(&closes[i - SENKOU_B_WINDOW..i]);
        }
    }
    cloud
}

fn midpoint(window: &[f64]) -> f64 {
    let (lo, hi) = window
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    (lo + hi) / 2.0
}
