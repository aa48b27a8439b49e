//! Wire types for the Bitget USDT-M futures REST API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Standard Bitget response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: String,
    pub msg: String,
    pub data: Option<T>,
}

/// Success code in the envelope.
pub const CODE_OK: &str = "00000";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerData {
    #[serde(default)]
    pub symbol: String,
    /// Last traded price, string-encoded by the exchange.
    pub last: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    pub order_id: String,
    #[serde(default)]
    pub client_oid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    pub margin_coin: String,
    pub available: String,
}

/// One candle as the exchange returns it:
/// `[ts, open, high, low, close, baseVolume, ...]`, all string-encoded.
pub type RawCandle = Vec<String>;

/// Parsed candle.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub ts: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

/// Engine-side view of an order submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: Decimal,
    pub price: Option<Decimal>,
    pub reduce_only: bool,
}

impl OrderRequest {
    /// Plain market order.
    pub fn market(symbol: &str, side: OrderSide, size: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            size,
            price: None,
            reduce_only: false,
        }
    }

    /// Reduce-only market order used to close a position.
    pub fn reduce_only(symbol: &str, side: OrderSide, size: Decimal) -> Self {
        Self {
            reduce_only: true,
            ..Self::market(symbol, side, size)
        }
    }
}

/// Reference to an order the exchange accepted.
#[derive(Debug, Clone)]
pub struct OrderRef {
    pub order_id: String,
    pub client_oid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_request_helpers() {
        let entry = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(10));
        assert!(!entry.reduce_only);
        assert_eq!(entry.order_type, OrderType::Market);
        assert!(entry.price.is_none());

        let exit = OrderRequest::reduce_only("BTCUSDT", OrderSide::Sell, dec!(10));
        assert!(exit.reduce_only);
        assert_eq!(exit.side, OrderSide::Sell);
    }

    #[test]
    fn sides_serialize_lowercase() {
        assert_eq!(OrderSide::Buy.as_str(), "buy");
        assert_eq!(OrderSide::Sell.as_str(), "sell");
        assert_eq!(OrderType::Market.as_str(), "market");
    }
}
