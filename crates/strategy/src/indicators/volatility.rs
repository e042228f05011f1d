use super::std_dev;

/// Historical volatility: population standard deviation of the last `period`
/// log returns, in percent. First value at index `period`.
pub fn historical_volatility(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![0.0; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    // returns[j] is the change from closes[j] to closes[j + 1]
    let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    for i in period..closes.len() {
        out[i] = std_dev(&returns[i - period..i]) * 100.0;
    }
    out
}
