use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};
use url::Url;

use common::{
    Balance, Error, ExchangeClient, OrderAcceptance, OrderRequest, OrderSide, OrderState,
    OrderStatus, Result, Ticker,
};

use super::TickerMessage;

const BASE_URL: &str = "https://api.bitflyer.com/v1/";

/// REST API client for bitFlyer. Used for order placement and account queries.
pub struct BitflyerClient {
    api_key: String,
    secret: String,
    base_url: Url,
    http: Client,
}

impl BitflyerClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, secret, BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        base_url: &str,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        let base_url = Url::parse(base_url).map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url,
            http,
        })
    }

    fn timestamp_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    /// Send a signed request; returns the HTTP status and raw body.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<(reqwest::StatusCode, String)> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| Error::Http(e.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let request_uri = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        let body = body.unwrap_or_default();
        let ts = Self::timestamp_secs().to_string();
        let signature = sign(&self.secret, &ts, method.as_str(), &request_uri, &body)?;

        let resp = self
            .http
            .request(method, url)
            .header("ACCESS-KEY", &self.api_key)
            .header("ACCESS-TIMESTAMP", &ts)
            .header("ACCESS-SIGN", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok((status, text))
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let (status, body) = self.request(Method::GET, path, query, None).await?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }
}

/// `ACCESS-SIGN`: hex HMAC-SHA256 over timestamp, method, request URI and body.
pub(crate) fn sign(
    secret: &str,
    timestamp: &str,
    method: &str,
    request_uri: &str,
    body: &str,
) -> Result<String> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Exchange(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(request_uri.as_bytes());
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl ExchangeClient for BitflyerClient {
    async fn balances(&self) -> Result<Vec<Balance>> {
        let body = self.get("me/getbalance", &[]).await?;
        let balances: Vec<BalanceResponse> =
            serde_json::from_str(&body).map_err(|e| Error::Exchange(e.to_string()))?;
        Ok(balances
            .into_iter()
            .map(|b| Balance {
                currency_code: b.currency_code,
                available: b.available,
            })
            .collect())
    }

    async fn ticker(&self, product_code: &str) -> Result<Ticker> {
        let body = self
            .get("ticker", &[("product_code", product_code)])
            .await?;
        let msg: TickerMessage =
            serde_json::from_str(&body).map_err(|e| Error::Exchange(e.to_string()))?;
        msg.into_ticker()
            .ok_or_else(|| Error::Exchange(format!("unreadable ticker timestamp for {product_code}")))
    }

    async fn send_order(&self, order: &OrderRequest) -> Result<OrderAcceptance> {
        let payload = SendChildOrder {
            product_code: &order.product_code,
            child_order_type: "MARKET",
            side: order.side,
            size: order.size,
            minute_to_expire: order.minute_to_expire,
            time_in_force: &order.time_in_force,
        };
        let body = serde_json::to_string(&payload)?;

        debug!(product_code = %order.product_code, side = %order.side, size = order.size, "Submitting order to bitFlyer");
        let (status, text) = self
            .request(Method::POST, "me/sendchildorder", &[], Some(body))
            .await?;

        if status.is_client_error() {
            // insufficient funds and similar business rejections
            warn!(%status, body = %text, "bitFlyer refused order");
            return Ok(OrderAcceptance {
                acceptance_id: String::new(),
            });
        }
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }

        let resp: SendOrderResponse =
            serde_json::from_str(&text).map_err(|e| Error::Exchange(e.to_string()))?;
        Ok(OrderAcceptance {
            acceptance_id: resp.child_order_acceptance_id,
        })
    }

    async fn list_orders(
        &self,
        product_code: &str,
        acceptance_id: &str,
    ) -> Result<Vec<OrderStatus>> {
        let body = self
            .get(
                "me/getchildorders",
                &[
                    ("product_code", product_code),
                    ("child_order_acceptance_id", acceptance_id),
                ],
            )
            .await?;
        let orders: Vec<ChildOrder> =
            serde_json::from_str(&body).map_err(|e| Error::Exchange(e.to_string()))?;
        Ok(orders
            .into_iter()
            .map(|o| OrderStatus {
                side: o.side,
                state: o.child_order_state,
                average_price: o.average_price,
                size: o.size,
            })
            .collect())
    }
}

// ─── Request / response types ────────────────────────────────────────────────

#[derive(Serialize)]
struct SendChildOrder<'a> {
    product_code: &'a str,
    child_order_type: &'a str,
    side: OrderSide,
    size: f64,
    minute_to_expire: u32,
    time_in_force: &'a str,
}

#[derive(Deserialize)]
struct SendOrderResponse {
    #[serde(default)]
    child_order_acceptance_id: String,
}

#[derive(Deserialize)]
struct BalanceResponse {
    currency_code: String,
    available: f64,
}

#[derive(Deserialize)]
struct ChildOrder {
    side: OrderSide,
    child_order_state: OrderState,
    #[serde(default)]
    average_price: f64,
    size: f64,
}
