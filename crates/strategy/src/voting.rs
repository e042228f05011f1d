use common::OrderSide;

use crate::frame::DataFrame;
use crate::params::TradeParams;
use crate::rules::Strategy;

/// Candle volume a gated vote needs to exceed.
pub const MIN_VOLUME: f64 = 100.0;

/// Votes needed beyond one: a decision fires at two agreeing strategies.
pub const VOTE_THRESHOLD: usize = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub buy_votes: usize,
    pub sell_votes: usize,
}

/// Combines the enabled strategies of a parameter set into one decision per
/// candle.
pub struct VotingEngine {
    strategies: Vec<Box<dyn Strategy>>,
}

impl VotingEngine {
    /// Compute the indicator series of every enabled strategy over `df`.
    pub fn new(params: &TradeParams, df: &DataFrame) -> Self {
        Self {
            strategies: params.enabled().map(|p| p.build(df)).collect(),
        }
    }

    pub fn from_strategies(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Count the buy and sell votes on candle `i`, starting from zero.
    pub fn tally(&self, df: &DataFrame, i: usize) -> Tally {
        let mut tally = Tally::default();
        let active = df.volume(i) > MIN_VOLUME;
        for strategy in &self.strategies {
            let Some(side) = strategy.signal(df, i) else {
                continue;
            };
            if strategy.volume_gated(side) && !active {
                continue;
            }
            match side {
                OrderSide::Buy => tally.buy_votes += 1,
                OrderSide::Sell => tally.sell_votes += 1,
            }
        }
        tally
    }

    /// Decision for candle `i`. A buy majority wins outright; otherwise a
    /// sell majority or a close under `stop_loss` sells.
    pub fn decide(&self, df: &DataFrame, i: usize, stop_loss: Option<f64>) -> Option<OrderSide> {
        let tally = self.tally(df, i);
        if tally.buy_votes > VOTE_THRESHOLD {
            return Some(OrderSide::Buy);
        }
        let close = df.candles.get(i)?.close;
        let stopped = stop_loss.is_some_and(|stop| stop > close);
        if tally.sell_votes > VOTE_THRESHOLD || stopped {
            return Some(OrderSide::Sell);
        }
        None
    }
}
