//! Signed REST client for Bitget USDT-M futures.
//!
//! Every request carries an HMAC-SHA256 signature over
//! `timestamp + method + requestPath + body`, base64-encoded, in the
//! `ACCESS-*` headers. Demo accounts are selected with the
//! `X-SIMULATED-TRADING` header.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::json;
use sha2::Sha256;
use tracing::debug;

use crate::error::ExchangeError;

use super::types::*;
use super::ExchangeClient;

const DEFAULT_BASE_URL: &str = "https://api.bitget.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MARGIN_COIN: &str = "USDT";
const PRODUCT_TYPE: &str = "USDT-FUTURES";

type HmacSha256 = Hmac<Sha256>;

/// REST client holding the API credentials.
pub struct BitgetClient {
    http: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    passphrase: String,
    demo: bool,
}

impl BitgetClient {
    /// Build a client from `BITGET_*` environment variables.
    pub fn from_env() -> Result<Self, ExchangeError> {
        let base_url =
            std::env::var("BITGET_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = require_env("BITGET_API_KEY")?;
        let secret_key = require_env("BITGET_SECRET_KEY")?;
        let passphrase = require_env("BITGET_PASSPHRASE")?;
        let demo = std::env::var("BITGET_DEMO")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ExchangeError::Transport)?;

        Ok(Self {
            http,
            base_url,
            api_key,
            secret_key,
            passphrase,
            demo,
        })
    }

    fn sign(
        &self,
        timestamp: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> Result<String, ExchangeError> {
        let message = format!("{timestamp}{method}{request_path}{body}");
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| ExchangeError::InvalidResponse(format!("bad secret key: {e}")))?;
        mac.update(message.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// Send one signed request and unwrap the response envelope.
    /// `request_path` must include the query string; it is part of the
    /// signed message.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        request_path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ExchangeError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let body_str = body.as_ref().map(|b| b.to_string()).unwrap_or_default();
        let signature = self.sign(&timestamp, method.as_str(), request_path, &body_str)?;
        let url = format!("{}{}", self.base_url, request_path);

        debug!(%url, "bitget request");

        let mut request = self
            .http
            .request(method, &url)
            .header("ACCESS-KEY", &self.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", &timestamp)
            .header("ACCESS-PASSPHRASE", &self.passphrase)
            .header("Content-Type", "application/json")
            .header("X-SIMULATED-TRADING", if self.demo { "1" } else { "0" });

        if !body_str.is_empty() {
            request = request.body(body_str);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Rejected {
                code: status.as_u16().to_string(),
                message,
            });
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;

        if envelope.code != CODE_OK {
            return Err(ExchangeError::Rejected {
                code: envelope.code,
                message: envelope.msg,
            });
        }

        envelope
            .data
            .ok_or_else(|| ExchangeError::InvalidResponse("missing data field".into()))
    }
}

fn require_env(name: &str) -> Result<String, ExchangeError> {
    std::env::var(name).map_err(|_| ExchangeError::Credentials(name.to_string()))
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, ExchangeError> {
    Decimal::from_str(raw)
        .map_err(|e| ExchangeError::InvalidResponse(format!("{field} `{raw}`: {e}")))
}

#[async_trait]
impl ExchangeClient for BitgetClient {
    async fn get_ticker(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let path = format!("/api/mix/v1/market/ticker?symbol={symbol}");
        let ticker: TickerData = self.request(Method::GET, &path, None).await?;
        parse_decimal("ticker.last", &ticker.last)
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let path = format!(
            "/api/mix/v1/market/candles?symbol={symbol}&granularity={interval}&limit={limit}"
        );
        let raw: Vec<RawCandle> = self.request(Method::GET, &path, None).await?;

        raw.into_iter()
            .map(|row| {
                if row.len() < 6 {
                    return Err(ExchangeError::InvalidResponse(format!(
                        "candle row with {} fields",
                        row.len()
                    )));
                }
                Ok(Candle {
                    ts: row[0].parse::<i64>().map_err(|e| {
                        ExchangeError::InvalidResponse(format!("candle.ts `{}`: {e}", row[0]))
                    })?,
                    open: parse_decimal("candle.open", &row[1])?,
                    high: parse_decimal("candle.high", &row[2])?,
                    low: parse_decimal("candle.low", &row[3])?,
                    close: parse_decimal("candle.close", &row[4])?,
                    volume: parse_decimal("candle.volume", &row[5])?,
                })
            })
            .collect()
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderRef, ExchangeError> {
        let mut body = json!({
            "symbol": request.symbol,
            "marginCoin": MARGIN_COIN,
            "side": request.side.as_str(),
            "orderType": request.order_type.as_str(),
            "size": request.size.to_string(),
            "timeInForceValue": "normal",
            "reduceOnly": request.reduce_only,
        });
        if let Some(price) = request.price {
            body["price"] = json!(price.to_string());
        }

        let data: OrderData = self
            .request(Method::POST, "/api/mix/v1/order/placeOrder", Some(body))
            .await?;

        Ok(OrderRef {
            order_id: data.order_id,
            client_oid: data.client_oid,
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ExchangeError> {
        let body = json!({
            "symbol": symbol,
            "marginCoin": MARGIN_COIN,
            "orderId": order_id,
        });
        let _: serde_json::Value = self
            .request(Method::POST, "/api/mix/v1/order/cancel-order", Some(body))
            .await?;
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        let body = json!({
            "symbol": symbol,
            "marginCoin": MARGIN_COIN,
            "leverage": leverage.to_string(),
            "holdSide": "long_short",
        });
        let _: serde_json::Value = self
            .request(Method::POST, "/api/mix/v1/account/setLeverage", Some(body))
            .await?;
        Ok(())
    }

    async fn get_balance(&self) -> Result<Decimal, ExchangeError> {
        let path = format!("/api/mix/v1/account/accounts?productType={PRODUCT_TYPE}");
        let accounts: Vec<AccountData> = self.request(Method::GET, &path, None).await?;

        let account = accounts
            .iter()
            .find(|a| a.margin_coin == MARGIN_COIN)
            .ok_or_else(|| {
                ExchangeError::InvalidResponse(format!("no {MARGIN_COIN} account returned"))
            })?;

        parse_decimal("account.available", &account.available)
    }
}
