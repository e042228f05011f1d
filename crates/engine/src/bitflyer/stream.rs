use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use common::{Error, Result, Ticker};

use super::TickerMessage;

const WS_URL: &str = "wss://ws.lightstream.bitflyer.com/json-rpc";

/// bitFlyer realtime ticker stream for a single product.
///
/// Subscribes to the `lightning_ticker_<product>` JSON-RPC channel, parses
/// channel messages into `Ticker`, and publishes them on a broadcast channel.
/// Reconnects automatically with exponential backoff.
pub struct BitflyerStream {
    product_code: String,
    ticker_tx: broadcast::Sender<Ticker>,
}

impl BitflyerStream {
    pub fn new(product_code: impl Into<String>, ticker_tx: broadcast::Sender<Ticker>) -> Self {
        Self {
            product_code: product_code.into(),
            ticker_tx,
        }
    }

    /// Run the stream loop forever, reconnecting on failure.
    /// Call this inside a `tokio::spawn`.
    pub async fn run(self) {
        let mut backoff = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(60);

        loop {
            info!(product_code = %self.product_code, "Connecting to bitFlyer realtime stream");
            match self.connect_once().await {
                Ok(()) => {
                    info!(product_code = %self.product_code, "Realtime stream closed cleanly");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    backoff = Duration::from_secs(1);
                }
                Err(e) => {
                    warn!(product_code = %self.product_code, error = %e, backoff = ?backoff, "Realtime stream error, reconnecting");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect_once(&self) -> Result<()> {
        let url = Url::parse(WS_URL).map_err(|e| Error::WebSocket(e.to_string()))?;
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = subscribe_message(&self.product_code);
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        while let Some(msg) = read.next().await {
            let msg = msg.map_err(|e| Error::WebSocket(e.to_string()))?;

            match msg {
                Message::Text(text) => match parse_channel_message(&text) {
                    Ok(Some(ticker)) => {
                        // no receivers is fine
                        let _ = self.ticker_tx.send(ticker);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "Failed to parse ticker message");
                    }
                },
                Message::Ping(payload) => {
                    write
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| Error::WebSocket(e.to_string()))?;
                }
                Message::Close(frame) => {
                    debug!(?frame, "Server closed realtime stream");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn subscribe_message(product_code: &str) -> serde_json::Value {
    json!({
        "jsonrpc": "2.0",
        "method": "subscribe",
        "params": { "channel": format!("lightning_ticker_{product_code}") },
    })
}

// ─── JSON-RPC parsing ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    method: String,
    params: Option<ChannelParams>,
}

#[derive(Deserialize)]
struct ChannelParams {
    message: TickerMessage,
}

/// `Ok(None)` for anything that is not a ticker channel message.
fn parse_channel_message(text: &str) -> Result<Option<Ticker>> {
    let envelope: RpcEnvelope = serde_json::from_str(text)?;
    if envelope.method != "channelMessage" {
        return Ok(None);
    }
    let Some(params) = envelope.params else {
        return Ok(None);
    };
    params
        .message
        .into_ticker()
        .map(Some)
        .ok_or_else(|| Error::Exchange("unreadable ticker timestamp".into()))
}
