use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use common::{Candle, CandleStore, Interval, Result, Ticker};

/// Folds ticks into one open candle per interval and persists every change.
pub struct CandleAggregator {
    product_code: String,
    intervals: Vec<Interval>,
    store: Arc<dyn CandleStore>,
    open: HashMap<Interval, Candle>,
}

impl CandleAggregator {
    pub fn new(
        product_code: impl Into<String>,
        intervals: Vec<Interval>,
        store: Arc<dyn CandleStore>,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            intervals,
            store,
            open: HashMap::new(),
        }
    }

    /// Apply one tick to every interval. Returns the candles this tick
    /// closed, i.e. the open candles replaced by a newer interval slot.
    ///
    /// A store failure leaves that interval's open candle in place, so the
    /// next tick retries the close. The error is returned only when no other
    /// interval closed a candle on this tick.
    pub async fn ingest(&mut self, ticker: &Ticker) -> Result<Vec<Candle>> {
        if ticker.product_code != self.product_code {
            return Ok(Vec::new());
        }

        let mut closed = Vec::new();
        let mut failure = None;

        for interval in self.intervals.clone() {
            match self.advance(interval, ticker).await {
                Ok(Some(previous)) => closed.push(previous),
                Ok(None) => {}
                Err(e) => {
                    warn!(%interval, error = %e, "Candle store failed, keeping open candle");
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            Some(e) if closed.is_empty() => Err(e),
            _ => Ok(closed),
        }
    }

    /// Fold the tick into `interval`'s open candle. The map only changes
    /// after the store accepted the new state.
    async fn advance(&mut self, interval: Interval, ticker: &Ticker) -> Result<Option<Candle>> {
        let slot = interval.truncate(ticker.time);
        let price = ticker.mid_price();

        let current = match self.open.get(&interval) {
            Some(open) if open.time == slot => {
                let mut candle = open.clone();
                candle.absorb(price, ticker.volume);
                candle
            }
            Some(open) if open.time > slot => {
                debug!(%interval, tick = %ticker.time, "Dropping late tick");
                return Ok(None);
            }
            _ => match self.store.candle_at(&self.product_code, interval, slot).await? {
                // restarted inside an interval that already has data
                Some(mut candle) => {
                    candle.absorb(price, ticker.volume);
                    candle
                }
                None => Candle::open_at(
                    self.product_code.clone(),
                    interval,
                    slot,
                    price,
                    ticker.volume,
                ),
            },
        };

        self.store.upsert_candle(&current).await?;
        Ok(self
            .open
            .insert(interval, current)
            .filter(|previous| previous.time != slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use common::Error;
    use store::SqliteStore;

    /// SQLite store whose next `candle_at` lookup fails once when armed.
    struct FlakyStore {
        inner: SqliteStore,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl CandleStore for FlakyStore {
        async fn candle_at(
            &self,
            product_code: &str,
            interval: Interval,
            time: DateTime<Utc>,
        ) -> Result<Option<Candle>> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(Error::Other("db busy".into()));
            }
            self.inner.candle_at(product_code, interval, time).await
        }

        async fn upsert_candle(&self, candle: &Candle) -> Result<()> {
            self.inner.upsert_candle(candle).await
        }

        async fn latest_candles(
            &self,
            product_code: &str,
            interval: Interval,
            limit: usize,
        ) -> Result<Vec<Candle>> {
            self.inner.latest_candles(product_code, interval, limit).await
        }
    }

    async fn flaky_store() -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            inner: SqliteStore::in_memory().await.unwrap(),
            fail_next: AtomicBool::new(false),
        })
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    fn tick(time: DateTime<Utc>, bid: f64, ask: f64, volume: f64) -> Ticker {
        Ticker {
            product_code: "BTC_USD".into(),
            time,
            best_bid: bid,
            best_ask: ask,
            volume,
        }
    }

    #[tokio::test]
    async fn ticks_in_one_interval_build_one_candle() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let mut agg = CandleAggregator::new("BTC_USD", vec![Interval::OneMinute], store.clone());

        assert!(agg.ingest(&tick(at(0, 0, 5), 99.0, 101.0, 1.0)).await.unwrap().is_empty());
        assert!(agg.ingest(&tick(at(0, 0, 20), 109.0, 111.0, 2.0)).await.unwrap().is_empty());
        assert!(agg.ingest(&tick(at(0, 0, 50), 89.0, 91.0, 3.0)).await.unwrap().is_empty());

        let candle = store
            .candle_at("BTC_USD", Interval::OneMinute, at(0, 0, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!((candle.open, candle.high, candle.low, candle.close), (100.0, 110.0, 90.0, 90.0));
        assert_eq!(candle.volume, 6.0);
    }

    #[tokio::test]
    async fn next_interval_closes_previous_candle() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let mut agg = CandleAggregator::new(
            "BTC_USD",
            vec![Interval::OneMinute, Interval::OneHour],
            store.clone(),
        );

        agg.ingest(&tick(at(0, 0, 5), 99.0, 101.0, 1.0)).await.unwrap();
        let closed = agg.ingest(&tick(at(0, 1, 0), 104.0, 106.0, 1.0)).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].interval, Interval::OneMinute);
        assert_eq!(closed[0].time, at(0, 0, 0));
        assert_eq!(closed[0].close, 100.0);

        // a late tick for the closed minute is dropped
        assert!(agg.ingest(&tick(at(0, 0, 59), 1.0, 1.0, 1.0)).await.unwrap().is_empty());
        let hour = store
            .candle_at("BTC_USD", Interval::OneHour, at(0, 0, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hour.close, 1.0);
        assert_eq!(hour.high, 105.0);
    }

    #[tokio::test]
    async fn restart_continues_stored_candle() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        store
            .upsert_candle(&Candle::open_at("BTC_USD", Interval::OneMinute, at(0, 0, 0), 100.0, 5.0))
            .await
            .unwrap();

        let mut agg = CandleAggregator::new("BTC_USD", vec![Interval::OneMinute], store.clone());
        agg.ingest(&tick(at(0, 0, 30), 119.0, 121.0, 1.0)).await.unwrap();

        let candle = store
            .candle_at("BTC_USD", Interval::OneMinute, at(0, 0, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(candle.open, 100.0);
        assert_eq!(candle.close, 120.0);
        assert_eq!(candle.volume, 6.0);
    }

    #[tokio::test]
    async fn other_products_are_ignored() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let mut agg = CandleAggregator::new("BTC_USD", vec![Interval::OneMinute], store.clone());
        let mut t = tick(at(0, 0, 5), 1.0, 1.0, 1.0);
        t.product_code = "ETH_USD".into();
        agg.ingest(&t).await.unwrap();
        assert!(store
            .latest_candles("ETH_USD", Interval::OneMinute, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn failed_lookup_keeps_candle_open_for_next_tick() {
        let store = flaky_store().await;
        let mut agg = CandleAggregator::new("BTC_USD", vec![Interval::OneMinute], store.clone());

        agg.ingest(&tick(at(0, 0, 5), 99.0, 101.0, 1.0)).await.unwrap();
        store.fail_next.store(true, Ordering::SeqCst);
        assert!(agg.ingest(&tick(at(0, 1, 0), 104.0, 106.0, 1.0)).await.is_err());

        let closed = agg.ingest(&tick(at(0, 1, 1), 104.0, 106.0, 1.0)).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].time, at(0, 0, 0));
        assert_eq!(closed[0].close, 100.0);
    }

    #[tokio::test]
    async fn failure_on_one_interval_still_returns_other_closes() {
        let store = flaky_store().await;
        let mut agg = CandleAggregator::new(
            "BTC_USD",
            vec![Interval::OneMinute, Interval::OneSecond],
            store.clone(),
        );

        agg.ingest(&tick(at(0, 0, 59), 99.0, 101.0, 1.0)).await.unwrap();
        // the one-minute lookup fails, the one-second close goes through
        store.fail_next.store(true, Ordering::SeqCst);
        let closed = agg.ingest(&tick(at(0, 1, 0), 104.0, 106.0, 1.0)).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].interval, Interval::OneSecond);
        assert_eq!(closed[0].time, at(0, 0, 59));

        let closed = agg.ingest(&tick(at(0, 1, 1), 104.0, 106.0, 1.0)).await.unwrap();
        let minutes: Vec<_> = closed.iter().filter(|c| c.interval == Interval::OneMinute).collect();
        assert_eq!(minutes.len(), 1);
        assert_eq!(minutes[0].time, at(0, 0, 0));
        assert_eq!(minutes[0].close, 100.0);
    }
}
