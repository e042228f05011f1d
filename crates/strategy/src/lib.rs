pub mod backtest;
pub mod frame;
pub mod indicators;
pub mod ledger;
pub mod optimizer;
pub mod params;
pub mod rules;
pub mod voting;

pub use backtest::{backtest, backtest_profit, BACKTEST_SIZE};
pub use frame::DataFrame;
pub use ledger::PositionLedger;
pub use optimizer::Optimizer;
pub use params::{ParamsHandle, StrategyKind, StrategyParams, StrategySlot, TradeParams};
pub use rules::Strategy;
pub use voting::{Tally, VotingEngine, MIN_VOLUME};
