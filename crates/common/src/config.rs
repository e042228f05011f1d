use std::path::Path;

use serde::Deserialize;

use crate::{Error, Interval, Result, TradingMode};

/// Process configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange credentials (required in live mode only)
    pub bitflyer_api_key: String,
    pub bitflyer_secret: String,

    // HTTP
    pub api_port: u16,

    // Trading
    pub trading_mode: TradingMode,
    pub paper_balance: f64,
    pub paper_slippage_bps: f64,

    // Database
    pub database_url: String,

    // Trading config file path
    pub trading_config_path: String,
}

impl Config {
    /// Load configuration from the environment. Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode = match required_env("TRADING_MODE")?.to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let (bitflyer_api_key, bitflyer_secret) = match trading_mode {
            TradingMode::Live => (
                required_env("BITFLYER_API_KEY")?,
                required_env("BITFLYER_SECRET")?,
            ),
            TradingMode::Paper => (
                optional_env("BITFLYER_API_KEY").unwrap_or_default(),
                optional_env("BITFLYER_SECRET").unwrap_or_default(),
            ),
        };

        Ok(Config {
            bitflyer_api_key,
            bitflyer_secret,
            api_port: parsed_env("API_PORT", 8080)?,
            trading_mode,
            paper_balance: parsed_env("PAPER_BALANCE", 10_000.0)?,
            paper_slippage_bps: parsed_env("PAPER_SLIPPAGE_BPS", 10.0)?,
            database_url: optional_env("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://flyerbot.db".to_string()),
            trading_config_path: optional_env("TRADING_CONFIG_PATH")
                .unwrap_or_else(|| "config/trading.toml".to_string()),
        })
    }
}

/// Trading parameters read from the TOML file.
///
/// Example `config/trading.toml`:
/// ```toml
/// product_code = "BTC_USD"
/// trade_interval = "1m"
/// use_percent = 0.9
/// data_limit = 365
/// stop_limit_percent = 0.9
/// num_ranking = 3
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Instrument as `BASE_QUOTE`, e.g. "BTC_USD".
    pub product_code: String,
    /// Interval whose closed candles drive trading decisions.
    pub trade_interval: Interval,
    /// Intervals aggregated from the tick stream.
    #[serde(default = "default_intervals")]
    pub intervals: Vec<Interval>,
    /// Fraction of the quote balance spent on a buy.
    pub use_percent: f64,
    /// Candles loaded for evaluation and calibration.
    pub data_limit: usize,
    /// Stop loss is placed at buy close × this fraction.
    pub stop_limit_percent: f64,
    /// How many of the best strategies may vote.
    pub num_ranking: usize,
    #[serde(default = "default_minute_to_expire")]
    pub minute_to_expire: u32,
    /// Share of an order size reserved for exchange fees.
    #[serde(default = "default_fee_fraction")]
    pub fee_fraction: f64,
}

fn default_intervals() -> Vec<Interval> {
    Interval::ALL.to_vec()
}

fn default_minute_to_expire() -> u32 {
    1
}

fn default_fee_fraction() -> f64 {
    0.15
}

impl TradingConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read trading config at '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut cfg: TradingConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse trading config: {e}")))?;
        if !cfg.intervals.contains(&cfg.trade_interval) {
            cfg.intervals.push(cfg.trade_interval);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.product_code.split_once('_').is_none() {
            return Err(Error::Config(format!(
                "product_code must look like BASE_QUOTE, got '{}'",
                self.product_code
            )));
        }
        if !(self.use_percent > 0.0 && self.use_percent <= 1.0) {
            return Err(Error::Config("use_percent must be in (0, 1]".into()));
        }
        if !(self.stop_limit_percent > 0.0 && self.stop_limit_percent < 1.0) {
            return Err(Error::Config("stop_limit_percent must be in (0, 1)".into()));
        }
        if !(1..=5).contains(&self.num_ranking) {
            return Err(Error::Config("num_ranking must be between 1 and 5".into()));
        }
        if self.data_limit < 2 {
            return Err(Error::Config("data_limit must be at least 2".into()));
        }
        if !(0.0..1.0).contains(&self.fee_fraction) {
            return Err(Error::Config("fee_fraction must be in [0, 1)".into()));
        }
        Ok(())
    }

    /// Base currency, e.g. "BTC" for "BTC_USD".
    pub fn coin_code(&self) -> &str {
        self.product_code
            .split_once('_')
            .map(|(coin, _)| coin)
            .unwrap_or(&self.product_code)
    }

    /// Quote currency, e.g. "USD" for "BTC_USD".
    pub fn currency_code(&self) -> &str {
        self.product_code
            .split_once('_')
            .map(|(_, currency)| currency)
            .unwrap_or(&self.product_code)
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("environment variable '{key}' is malformed: '{raw}'"))),
        None => Ok(default),
    }
}
