pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use config::{Config, TradingConfig};
pub use error::{Error, Result};
pub use exchange::{CandleStore, ExchangeClient, SignalStore};
pub use types::*;
