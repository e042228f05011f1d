use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use common::Interval;
use strategy::{DataFrame, PositionLedger};

use crate::AppState;

/// Candles returned when `limit` is missing or out of range.
const MAX_CANDLES: usize = 1000;

type ApiError = (StatusCode, Json<Value>);

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/candle", get(get_candles))
        .route("/api/params", get(get_params))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message.into() })))
}

fn internal(e: common::Error) -> ApiError {
    warn!(error = %e, "Chart query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "storage error" })),
    )
}

// ─── Candles ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CandleQuery {
    product_code: Option<String>,
    duration: Option<String>,
    limit: Option<i64>,

    sma: Option<String>,
    #[serde(rename = "smaPeriod1")]
    sma_period1: Option<usize>,
    #[serde(rename = "smaPeriod2")]
    sma_period2: Option<usize>,
    #[serde(rename = "smaPeriod3")]
    sma_period3: Option<usize>,

    ema: Option<String>,
    #[serde(rename = "emaPeriod1")]
    ema_period1: Option<usize>,
    #[serde(rename = "emaPeriod2")]
    ema_period2: Option<usize>,
    #[serde(rename = "emaPeriod3")]
    ema_period3: Option<usize>,

    bbands: Option<String>,
    #[serde(rename = "bbandsN")]
    bbands_n: Option<usize>,
    #[serde(rename = "bbandsK")]
    bbands_k: Option<f64>,

    ichimoku: Option<String>,

    rsi: Option<String>,
    #[serde(rename = "rsiPeriod")]
    rsi_period: Option<usize>,

    macd: Option<String>,
    #[serde(rename = "macdPeriod1")]
    macd_period1: Option<usize>,
    #[serde(rename = "macdPeriod2")]
    macd_period2: Option<usize>,
    #[serde(rename = "macdPeriod3")]
    macd_period3: Option<usize>,

    hv: Option<String>,
    #[serde(rename = "hvPeriod1")]
    hv_period1: Option<usize>,
    #[serde(rename = "hvPeriod2")]
    hv_period2: Option<usize>,
    #[serde(rename = "hvPeriod3")]
    hv_period3: Option<usize>,

    events: Option<String>,
}

/// A chart flag is on when present with any value other than empty or "false".
fn enabled(flag: &Option<String>) -> bool {
    flag.as_deref().is_some_and(|v| !v.is_empty() && v != "false")
}

fn clamp_limit(limit: Option<i64>) -> usize {
    match limit {
        Some(n) if n > 0 && n as usize <= MAX_CANDLES => n as usize,
        _ => MAX_CANDLES,
    }
}

async fn get_candles(
    State(state): State<AppState>,
    Query(q): Query<CandleQuery>,
) -> Result<Json<DataFrame>, ApiError> {
    let product_code = match q.product_code.as_deref() {
        Some(code) if !code.is_empty() => code.to_string(),
        _ => return Err(bad_request("No product_code param")),
    };
    let interval: Interval = match q.duration.as_deref() {
        None | Some("") => Interval::OneMinute,
        Some(d) => d.parse().map_err(|e: common::Error| bad_request(e.to_string()))?,
    };
    let limit = clamp_limit(q.limit);

    let candles = state
        .candles
        .latest_candles(&product_code, interval, limit)
        .await
        .map_err(internal)?;
    let mut df = DataFrame::new(product_code.clone(), interval, candles);

    if enabled(&q.sma) {
        df.add_sma(q.sma_period1.unwrap_or(7));
        df.add_sma(q.sma_period2.unwrap_or(14));
        df.add_sma(q.sma_period3.unwrap_or(50));
    }
    if enabled(&q.ema) {
        df.add_ema(q.ema_period1.unwrap_or(7));
        df.add_ema(q.ema_period2.unwrap_or(14));
        df.add_ema(q.ema_period3.unwrap_or(50));
    }
    if enabled(&q.bbands) {
        df.add_bbands(q.bbands_n.unwrap_or(20), q.bbands_k.unwrap_or(2.0));
    }
    if enabled(&q.ichimoku) {
        df.add_ichimoku();
    }
    if enabled(&q.rsi) {
        df.add_rsi(q.rsi_period.unwrap_or(14));
    }
    if enabled(&q.macd) {
        df.add_macd(
            q.macd_period1.unwrap_or(12),
            q.macd_period2.unwrap_or(26),
            q.macd_period3.unwrap_or(9),
        );
    }
    if enabled(&q.hv) {
        df.add_hv(q.hv_period1.unwrap_or(21));
        df.add_hv(q.hv_period2.unwrap_or(63));
        df.add_hv(q.hv_period3.unwrap_or(252));
    }
    if enabled(&q.events) {
        if let Some(first) = df.candles.first().map(|c| c.time) {
            let signals = state
                .signals
                .signals_since(&product_code, first)
                .await
                .map_err(internal)?;
            df.attach_events(PositionLedger::from_events(signals));
        }
    }

    Ok(Json(df))
}

// ─── Parameters ───────────────────────────────────────────────────────────────

async fn get_params(State(state): State<AppState>) -> Json<Value> {
    match state.params.current().await {
        Some(params) => Json(json!(*params)),
        None => Json(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::{Duration, TimeZone, Utc};
    use tower::ServiceExt;

    use common::{Candle, CandleStore, OrderSide, SignalStore, TradeSignalEvent, TradingMode};
    use store::SqliteStore;
    use strategy::{ParamsHandle, StrategyParams, StrategySlot, TradeParams};

    use crate::router;

    async fn state() -> (AppState, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..30 {
            let close = 100.0 + (i % 7) as f64;
            store
                .upsert_candle(&Candle::open_at(
                    "BTC_USD",
                    common::Interval::OneMinute,
                    start + Duration::minutes(i),
                    close,
                    10.0,
                ))
                .await
                .unwrap();
        }
        let state = AppState {
            candles: store.clone(),
            signals: store.clone(),
            params: ParamsHandle::new(),
            trading_mode: TradingMode::Paper,
        };
        (state, store)
    }

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
        let resp = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn missing_product_code_is_bad_request() {
        let (state, _) = state().await;
        let (status, body) = get_json(state, "/api/candle").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn unknown_duration_is_bad_request() {
        let (state, _) = state().await;
        let (status, _) = get_json(state, "/api/candle?product_code=BTC_USD&duration=3d").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn candles_with_requested_indicators() {
        let (state, _) = state().await;
        let (status, body) = get_json(
            state,
            "/api/candle?product_code=BTC_USD&limit=20&sma=true&smaPeriod1=5&smaPeriod2=10&rsi=true",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["candles"].as_array().unwrap().len(), 20);
        assert_eq!(body["interval"], "1m");
        // the third default period (50) exceeds the data and is skipped
        assert_eq!(body["smas"].as_array().unwrap().len(), 2);
        assert_eq!(body["rsi"]["period"], 14);
        assert!(body.get("macd").is_none());
    }

    #[tokio::test]
    async fn events_since_first_candle_are_attached() {
        let (state, store) = state().await;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for (minute, side, price) in [(2, OrderSide::Buy, 100.0), (25, OrderSide::Buy, 101.0), (27, OrderSide::Sell, 104.0)] {
            store
                .insert_signal(&TradeSignalEvent {
                    time: start + Duration::minutes(minute),
                    product_code: "BTC_USD".into(),
                    side,
                    price,
                    size: 1.0,
                })
                .await
                .unwrap();
        }

        let (status, body) =
            get_json(state, "/api/candle?product_code=BTC_USD&limit=10&events=true").await;
        assert_eq!(status, StatusCode::OK);
        // first candle is minute 20, so the minute-2 buy is left out
        assert_eq!(body["events"]["signals"].as_array().unwrap().len(), 2);
        assert_eq!(body["events"]["profit"], 3.0);
    }

    #[tokio::test]
    async fn params_null_until_calibrated() {
        let (state, _) = state().await;
        let (_, body) = get_json(state.clone(), "/api/params").await;
        assert!(body.is_null());

        state
            .params
            .replace(Some(TradeParams {
                strategies: vec![StrategySlot {
                    enabled: true,
                    profit: 2.5,
                    params: StrategyParams::Rsi {
                        period: 14,
                        buy_threshold: 30.0,
                        sell_threshold: 70.0,
                    },
                }],
            }))
            .await;
        let (_, body) = get_json(state.clone(), "/api/params").await;
        assert_eq!(body["strategies"][0]["params"]["kind"], "rsi");

        let (_, health) = get_json(state, "/healthz").await;
        assert_eq!(health["params_active"], true);
        assert_eq!(health["mode"], "paper");
    }
}
