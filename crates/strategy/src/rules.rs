use common::OrderSide;

use crate::frame::DataFrame;
use crate::indicators::{self, Bands, Ichimoku, Macd};
use crate::params::StrategyKind;

/// One signal-generation technique bound to its indicator series.
///
/// `signal` compares candle `i - 1` with candle `i` and is shared by the
/// backtester and the live voting engine. Volume gating is applied by the
/// voting engine only.
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn signal(&self, df: &DataFrame, i: usize) -> Option<OrderSide>;

    /// Whether a vote on `side` requires the candle volume to clear the
    /// activity floor.
    fn volume_gated(&self, _side: OrderSide) -> bool {
        true
    }
}

// ─── EMA cross ────────────────────────────────────────────────────────────────

pub struct EmaCross {
    short_period: usize,
    long_period: usize,
    short: Vec<f64>,
    long: Vec<f64>,
}

impl EmaCross {
    pub fn new(df: &DataFrame, short_period: usize, long_period: usize) -> Self {
        Self {
            short_period,
            long_period,
            short: indicators::ema(df.closes(), short_period),
            long: indicators::ema(df.closes(), long_period),
        }
    }
}

impl Strategy for EmaCross {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ema
    }

    fn signal(&self, _df: &DataFrame, i: usize) -> Option<OrderSide> {
        if i == 0 || i < self.short_period || i < self.long_period || i >= self.short.len() {
            return None;
        }
        let (s, l) = (&self.short, &self.long);
        // golden cross
        if s[i - 1] < l[i - 1] && s[i] >= l[i] {
            return Some(OrderSide::Buy);
        }
        // dead cross
        if s[i - 1] > l[i - 1] && s[i] <= l[i] {
            return Some(OrderSide::Sell);
        }
        None
    }
}

// ─── Bollinger breakout ───────────────────────────────────────────────────────

pub struct BollingerBreakout {
    n: usize,
    bands: Bands,
}

impl BollingerBreakout {
    pub fn new(df: &DataFrame, n: usize, k: f64) -> Self {
        Self {
            n,
            bands: indicators::bbands(df.closes(), n, k),
        }
    }
}

impl Strategy for BollingerBreakout {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Bollinger
    }

    fn signal(&self, df: &DataFrame, i: usize) -> Option<OrderSide> {
        if i == 0 || i < self.n || i >= df.len() {
            return None;
        }
        let close = df.closes();
        let Bands { up, down, .. } = &self.bands;
        // re-entering from below the lower band
        if down[i - 1] > close[i - 1] && down[i] <= close[i] {
            return Some(OrderSide::Buy);
        }
        // falling back from above the upper band
        if up[i - 1] < close[i - 1] && up[i] >= close[i] {
            return Some(OrderSide::Sell);
        }
        None
    }

    fn volume_gated(&self, side: OrderSide) -> bool {
        side == OrderSide::Buy
    }
}

// ─── Ichimoku breakout ────────────────────────────────────────────────────────

pub struct IchimokuBreakout {
    cloud: Ichimoku,
}

impl IchimokuBreakout {
    pub fn new(df: &DataFrame) -> Self {
        Self {
            cloud: indicators::ichimoku(df.closes()),
        }
    }
}

impl Strategy for IchimokuBreakout {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ichimoku
    }

    fn signal(&self, df: &DataFrame, i: usize) -> Option<OrderSide> {
        if i == 0 || i >= df.len() {
            return None;
        }
        let c = &self.cloud;
        let (prev, cur) = (&df.candles[i - 1], &df.candles[i]);

        if c.chikou[i - 1] < prev.high
            && c.chikou[i] >= cur.high
            && c.senkou_a[i] < cur.low
            && c.senkou_b[i] < cur.low
            && c.tenkan[i] > c.kijun[i]
        {
            return Some(OrderSide::Buy);
        }
        if c.chikou[i - 1] > prev.low
            && c.chikou[i] <= cur.low
            && c.senkou_a[i] > cur.high
            && c.senkou_b[i] > cur.high
            && c.tenkan[i] < c.kijun[i]
        {
            return Some(OrderSide::Sell);
        }
        None
    }

    fn volume_gated(&self, side: OrderSide) -> bool {
        side == OrderSide::Buy
    }
}

// ─── MACD cross ───────────────────────────────────────────────────────────────

pub struct MacdCross {
    lines: Macd,
}

impl MacdCross {
    pub fn new(df: &DataFrame, fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            lines: indicators::macd(df.closes(), fast, slow, signal),
        }
    }
}

impl Strategy for MacdCross {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Macd
    }

    fn signal(&self, _df: &DataFrame, i: usize) -> Option<OrderSide> {
        if i == 0 || i >= self.lines.macd.len() {
            return None;
        }
        let (m, s) = (&self.lines.macd, &self.lines.signal);

        if m[i] < 0.0 && s[i] < 0.0 && m[i - 1] < s[i - 1] && m[i] >= s[i] {
            return Some(OrderSide::Buy);
        }
        if m[i] > 0.0 && s[i] > 0.0 && m[i - 1] > s[i - 1] && m[i] <= s[i] {
            return Some(OrderSide::Sell);
        }
        None
    }

    fn volume_gated(&self, side: OrderSide) -> bool {
        side == OrderSide::Buy
    }
}

// ─── RSI threshold cross ──────────────────────────────────────────────────────

pub struct RsiThreshold {
    values: Vec<f64>,
    buy_threshold: f64,
    sell_threshold: f64,
}

impl RsiThreshold {
    pub fn new(df: &DataFrame, period: usize, buy_threshold: f64, sell_threshold: f64) -> Self {
        Self {
            values: indicators::rsi(df.closes(), period),
            buy_threshold,
            sell_threshold,
        }
    }
}

impl Strategy for RsiThreshold {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rsi
    }

    fn signal(&self, _df: &DataFrame, i: usize) -> Option<OrderSide> {
        if i == 0 || i >= self.values.len() {
            return None;
        }
        let (prev, cur) = (self.values[i - 1], self.values[i]);
        // warm-up and saturated readings carry no signal
        if prev == 0.0 || prev == 100.0 {
            return None;
        }
        if prev < self.buy_threshold && cur >= self.buy_threshold {
            return Some(OrderSide::Buy);
        }
        if prev > self.sell_threshold && cur <= self.sell_threshold {
            return Some(OrderSide::Sell);
        }
        None
    }
}
