use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;

use common::{
    Candle, CandleStore, Error, Interval, OrderSide, Result, SignalStore, TradeSignalEvent,
};

/// SQLite persistence for candles and trade signal events.
///
/// Timestamps are stored as RFC 3339 UTC text with millisecond precision so
/// that lexical order matches time order.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    /// Private in-memory database, mainly for tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;
        info!("Database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("bad stored timestamp '{raw}': {e}")))
}

fn candle_from_row(row: &SqliteRow) -> Result<Candle> {
    let interval: String = row.try_get("interval")?;
    let time: String = row.try_get("time")?;
    Ok(Candle {
        product_code: row.try_get("product_code")?,
        interval: Interval::from_str(&interval)?,
        time: parse_time(&time)?,
        open: row.try_get("open")?,
        close: row.try_get("close")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        volume: row.try_get("volume")?,
    })
}

fn signal_from_row(row: &SqliteRow) -> Result<TradeSignalEvent> {
    let time: String = row.try_get("time")?;
    Ok(TradeSignalEvent {
        time: parse_time(&time)?,
        product_code: row.try_get("product_code")?,
        side: row.try_get::<OrderSide, _>("side")?,
        price: row.try_get("price")?,
        size: row.try_get("size")?,
    })
}

#[async_trait]
impl CandleStore for SqliteStore {
    async fn candle_at(
        &self,
        product_code: &str,
        interval: Interval,
        time: DateTime<Utc>,
    ) -> Result<Option<Candle>> {
        let row = sqlx::query(
            r#"
            SELECT product_code, interval, time, open, close, high, low, volume
            FROM candles
            WHERE product_code = ?1 AND interval = ?2 AND time = ?3
            "#,
        )
        .bind(product_code)
        .bind(interval.label())
        .bind(format_time(time))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(candle_from_row).transpose()
    }

    async fn upsert_candle(&self, candle: &Candle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO candles (product_code, interval, time, open, close, high, low, volume)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(product_code, interval, time) DO UPDATE SET
                open = excluded.open,
                close = excluded.close,
                high = excluded.high,
                low = excluded.low,
                volume = excluded.volume
            "#,
        )
        .bind(&candle.product_code)
        .bind(candle.interval.label())
        .bind(format_time(candle.time))
        .bind(candle.open)
        .bind(candle.close)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.volume)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_candles(
        &self,
        product_code: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT product_code, interval, time, open, close, high, low, volume
                FROM candles
                WHERE product_code = ?1 AND interval = ?2
                ORDER BY time DESC
                LIMIT ?3
            ) ORDER BY time ASC
            "#,
        )
        .bind(product_code)
        .bind(interval.label())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(candle_from_row).collect()
    }
}

#[async_trait]
impl SignalStore for SqliteStore {
    async fn insert_signal(&self, event: &TradeSignalEvent) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO signal_events (time, product_code, side, price, size)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(product_code, time) DO NOTHING
            "#,
        )
        .bind(format_time(event.time))
        .bind(&event.product_code)
        .bind(event.side)
        .bind(event.price)
        .bind(event.size)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn latest_signals(
        &self,
        product_code: &str,
        count: usize,
    ) -> Result<Vec<TradeSignalEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT time, product_code, side, price, size
                FROM signal_events
                WHERE product_code = ?1
                ORDER BY time DESC
                LIMIT ?2
            ) ORDER BY time ASC
            "#,
        )
        .bind(product_code)
        .bind(count as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(signal_from_row).collect()
    }

    async fn signals_since(
        &self,
        product_code: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeSignalEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT time, product_code, side, price, size
            FROM signal_events
            WHERE product_code = ?1 AND time >= ?2
            ORDER BY time ASC
            "#,
        )
        .bind(product_code)
        .bind(format_time(since))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(signal_from_row).collect()
    }
}
