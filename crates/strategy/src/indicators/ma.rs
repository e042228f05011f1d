/// Simple moving average. First value at index `period - 1`.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![0.0; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }

    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    out
}

/// Exponential moving average with smoothing `2 / (period + 1)`, seeded with
/// the SMA of the first `period` values at index `period - 1`.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![0.0; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut prev = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = prev;
    for i in period..values.len() {
        prev = values[i] * k + prev * (1.0 - k);
        out[i] = prev;
    }
    out
}
