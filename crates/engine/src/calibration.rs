use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use common::{CandleStore, Error, Interval, Result};
use strategy::{DataFrame, Optimizer, ParamsHandle};

/// Calibration retries wait this many trade intervals.
const RETRY_INTERVALS: u32 = 5;

/// Re-runs the optimizer over stored history and publishes the result.
pub struct Calibrator {
    product_code: String,
    interval: Interval,
    data_limit: usize,
    optimizer: Optimizer,
    candles: Arc<dyn CandleStore>,
    params: ParamsHandle,
}

impl Calibrator {
    pub fn new(
        product_code: impl Into<String>,
        interval: Interval,
        data_limit: usize,
        optimizer: Optimizer,
        candles: Arc<dyn CandleStore>,
        params: ParamsHandle,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            interval,
            data_limit,
            optimizer,
            candles,
            params,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        self.interval.duration() * RETRY_INTERVALS
    }

    /// One optimizer pass. The result replaces the active parameter set even
    /// when it is `None`. Returns whether parameters are now active.
    pub async fn calibrate(&self) -> Result<bool> {
        let candles = self
            .candles
            .latest_candles(&self.product_code, self.interval, self.data_limit)
            .await?;
        let count = candles.len();
        let df = DataFrame::new(self.product_code.clone(), self.interval, candles);

        let optimizer = self.optimizer;
        let found = tokio::task::spawn_blocking(move || optimizer.optimize(&df))
            .await
            .map_err(|e| Error::Other(format!("optimizer task failed: {e}")))?;

        match &found {
            Some(params) => {
                let enabled: Vec<String> = params.enabled().map(|p| p.kind().to_string()).collect();
                info!(candles = count, ?enabled, "Trade parameters calibrated");
            }
            None => info!(candles = count, "No profitable parameters, trading suspended"),
        }

        let ready = found.is_some();
        self.params.replace(found).await;
        Ok(ready)
    }

    /// Calibrate until a parameter set is found.
    pub async fn calibrate_until_ready(&self) {
        loop {
            match self.calibrate().await {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Calibration failed"),
            }
            tokio::time::sleep(self.retry_delay()).await;
        }
    }

    /// Detached recalibration; nothing waits on it.
    pub fn spawn_recalibration(self: &Arc<Self>) -> JoinHandle<()> {
        let calibrator = Arc::clone(self);
        tokio::spawn(async move { calibrator.calibrate_until_ready().await })
    }
}
