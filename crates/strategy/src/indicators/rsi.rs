/// RSI (Relative Strength Index) with Wilder smoothing.
///
/// The first value sits at index `period` and averages the first `period`
/// price changes. A window without any movement reads 0, a window of pure
/// gains reads 100.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![0.0; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = strength(avg_gain, avg_loss);

    let p = period as f64;
    for i in period + 1..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out[i] = strength(avg_gain, avg_loss);
    }
    out
}

fn strength(avg_gain: f64, avg_loss: f64) -> f64 {
    let total = avg_gain + avg_loss;
    if total == 0.0 {
        0.0
    } else {
        100.0 * avg_gain / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_zero_filled_when_insufficient_data() {
        let prices = vec![100.0; 14];
        assert!(rsi(&prices, 14).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn rsi_first_value_at_period() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&prices, 14);
        assert_eq!(out[13], 0.0);
        assert!(out[14] > 0.0);
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let prices = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let out = rsi(&prices, 3);
        assert!((out[4] - 100.0).abs() < 1e-6, "Expected ~100, got {}", out[4]);
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let prices = vec![14.0, 13.0, 12.0, 11.0, 10.0];
        let out = rsi(&prices, 3);
        assert!(out[4].abs() < 1e-6, "Expected ~0, got {}", out[4]);
    }

    #[test]
    fn rsi_stays_in_range() {
        let prices = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.15, 43.61, 44.33, 44.83, 45.10,
            45.15, 44.34, 44.09, 44.50, 44.71,
        ];
        for v in rsi(&prices, 14) {
            assert!((0.0..=100.0).contains(&v), "RSI out of range: {v}");
        }
    }
}
