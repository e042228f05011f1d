use serde::Serialize;

use super::ma::ema;

/// MACD (Moving Average Convergence/Divergence).
///
/// MACD line = EMA(fast) − EMA(slow), signal = EMA(signal) of the MACD line,
/// hist = MACD − signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Macd {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
}

/// All three lines start at `slow + signal - 2`; earlier indices are warm-up
/// zeros. Fast and slow are swapped if given in the wrong order.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let len = closes.len();
    let mut out = Macd {
        macd: vec![0.0; len],
        signal: vec![0.0; len],
        hist: vec![0.0; len],
    };
    let (fast, slow) = if slow < fast { (slow, fast) } else { (fast, slow) };
    if fast == 0 || signal == 0 || len <= slow {
        return out;
    }

    let start = slow - 1;
    if len - start <= signal {
        return out;
    }
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let line: Vec<f64> = (start..len).map(|i| fast_ema[i] - slow_ema[i]).collect();
    let signal_line = ema(&line, signal);

    for i in (start + signal - 1)..len {
        out.macd[i] = line[i - start];
        out.signal[i] = signal_line[i - start];
        out.hist[i] = out.macd[i] - out.signal[i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_up(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
    }

    #[test]
    fn macd_zero_filled_with_insufficient_data() {
        let out = macd(&[100.0; 26], 12, 26, 9);
        assert!(out.macd.iter().all(|v| *v == 0.0));
        assert_eq!(out.signal.len(), 26);
    }

    #[test]
    fn macd_alignment() {
        let prices = trending_up(60);
        let out = macd(&prices, 12, 26, 9);
        assert_eq!(out.macd[32], 0.0);
        assert!(out.macd[33] > 0.0);
        assert_eq!(out.signal[32], 0.0);
        assert!(out.signal[33] > 0.0);
        assert!((out.hist[40] - (out.macd[40] - out.signal[40])).abs() < 1e-12);
    }

    #[test]
    fn macd_swaps_reversed_periods() {
        let prices = trending_up(60);
        assert_eq!(macd(&prices, 26, 12, 9), macd(&prices, 12, 26, 9));
    }

    #[test]
    fn macd_positive_on_steady_uptrend() {
        let out = macd(&trending_up(80), 3, 6, 3);
        assert!(out.macd[79] > 0.0);
        assert!(out.signal[79] > 0.0);
    }
}
