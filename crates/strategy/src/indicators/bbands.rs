use serde::Serialize;

use super::std_dev;

/// Bollinger bands: SMA(n) ± k × population standard deviation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Bands {
    pub up: Vec<f64>,
    pub mid: Vec<f64>,
    pub down: Vec<f64>,
}

/// First value at index `n - 1`.
pub fn bbands(values: &[f64], n: usize, k: f64) -> Bands {
    let len = values.len();
    let mut bands = Bands {
        up: vec![0.0; len],
        mid: vec![0.0; len],
        down: vec![0.0; len],
    };
    if n == 0 || len < n {
        return bands;
    }

    for i in n - 1..len {
        let window = &values[i + 1 - n..=i];
        let mean = window.iter().sum::<f64>() / n as f64;
        let width = k * std_dev(window);
        bands.mid[i] = mean;
        bands.up[i] = mean + width;
        bands.down[i] = mean - width;
    }
    bands
}
