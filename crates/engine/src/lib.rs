pub mod bitflyer;
pub mod calibration;
pub mod candles;
pub mod confirm;
pub mod lifecycle;
pub mod session;
pub mod trader;

#[cfg(test)]
pub(crate) mod test_support;

pub use bitflyer::{BitflyerClient, BitflyerStream};
pub use calibration::Calibrator;
pub use candles::CandleAggregator;
pub use confirm::{ConfirmPolicy, ConfirmState, OrderConfirmation, MAX_WAIT, POLL_INTERVAL};
pub use lifecycle::Engine;
pub use session::{ActiveSession, SessionState, TradeSession};
pub use trader::{adjust_size, Execution, SessionOutcome, Trader, TraderConfig};
