use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// Liveness plus whether calibration has produced tradeable parameters.
async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let params_active = state.params.current().await.is_some();
    Json(json!({
        "status": "ok",
        "mode": state.trading_mode.to_string(),
        "params_active": params_active,
    }))
}
