pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use common::{CandleStore, Result, SignalStore, TradingMode};
use strategy::ParamsHandle;

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    pub candles: Arc<dyn CandleStore>,
    pub signals: Arc<dyn SignalStore>,
    pub params: ParamsHandle,
    pub trading_mode: TradingMode,
}

/// All routes with their state applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::api_router())
        .merge(routes::health_router())
        .with_state(state)
}

/// Build and run the chart API server.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(cors)
            .layer(CompressionLayer::new()),
    );

    info!(%addr, "Chart API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
