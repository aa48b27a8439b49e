//! Exchange connectivity: the capability trait the engine consumes and the
//! signed Bitget REST implementation behind it.

mod bitget;
mod types;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::ExchangeError;

pub use bitget::BitgetClient;
pub use types::{Candle, OrderRef, OrderRequest, OrderSide, OrderType};

/// Everything the engine needs from an exchange. All calls may fail with a
/// transport or rejection error; the engine treats any failure as "this
/// tick's action did not happen".
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Last traded price for a symbol.
    async fn get_ticker(&self, symbol: &str) -> Result<Decimal, ExchangeError>;

    /// Recent candles at the given granularity, newest last.
    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Submit an order. `Ok` means the exchange accepted it.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderRef, ExchangeError>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ExchangeError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError>;

    /// Available margin balance in the settlement currency.
    async fn get_balance(&self) -> Result<Decimal, ExchangeError>;
}
