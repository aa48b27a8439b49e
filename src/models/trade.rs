//! Persisted trade model: one record per position, created at open and
//! mutated on each DCA fill and on close. Never deleted by the engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Side of a position, fixed for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "OPEN",
            TradeStatus::Closed => "CLOSED",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(TradeStatus::Open),
            "CLOSED" => Ok(TradeStatus::Closed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    MaxDuration,
    Manual,
    PnlStagnant,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::TakeProfit => "TAKE_PROFIT",
            CloseReason::StopLoss => "STOP_LOSS",
            CloseReason::TrailingStop => "TRAILING_STOP",
            CloseReason::MaxDuration => "MAX_DURATION",
            CloseReason::Manual => "MANUAL",
            CloseReason::PnlStagnant => "PNL_STAGNANT",
        }
    }
}

impl FromStr for CloseReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TAKE_PROFIT" => Ok(CloseReason::TakeProfit),
            "STOP_LOSS" => Ok(CloseReason::StopLoss),
            "TRAILING_STOP" => Ok(CloseReason::TrailingStop),
            "MAX_DURATION" => Ok(CloseReason::MaxDuration),
            "MANUAL" => Ok(CloseReason::Manual),
            "PNL_STAGNANT" => Ok(CloseReason::PnlStagnant),
            other => Err(format!("unknown close reason: {other}")),
        }
    }
}

/// One persisted trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub symbol: String,
    pub bot_id: String,
    pub direction: Direction,
    /// Volume-weighted average entry; rewritten on each DCA fill.
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    /// Cumulative base-asset size across the entry and all DCA fills.
    pub quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub profit_loss: Option<Decimal>,
    pub status: TradeStatus,
    pub dca_count: u32,
    pub close_reason: Option<CloseReason>,
}

impl TradeRecord {
    /// Fresh OPEN record for a newly entered position.
    pub fn open(
        symbol: &str,
        bot_id: &str,
        direction: Direction,
        entry_price: Decimal,
        quantity: Decimal,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            bot_id: bot_id.to_string(),
            direction,
            entry_price,
            exit_price: None,
            quantity,
            entry_time,
            exit_time: None,
            profit_loss: None,
            status: TradeStatus::Open,
            dca_count: 0,
            close_reason: None,
        }
    }
}

/// Partial update to a trade record. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TradePatch {
    pub entry_price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub dca_count: Option<u32>,
    pub status: Option<TradeStatus>,
    pub exit_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
    pub profit_loss: Option<Decimal>,
    pub close_reason: Option<CloseReason>,
}

impl TradePatch {
    /// Patch written after a DCA fill.
    pub fn dca(entry_price: Decimal, quantity: Decimal, dca_count: u32) -> Self {
        Self {
            entry_price: Some(entry_price),
            quantity: Some(quantity),
            dca_count: Some(dca_count),
            ..Self::default()
        }
    }

    /// Patch written when the position is closed.
    pub fn close(
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
        profit_loss: Decimal,
        reason: CloseReason,
    ) -> Self {
        Self {
            status: Some(TradeStatus::Closed),
            exit_price: Some(exit_price),
            exit_time: Some(exit_time),
            profit_loss: Some(profit_loss),
            close_reason: Some(reason),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn direction_round_trip() {
        for direction in [Direction::Long, Direction::Short] {
            assert_eq!(direction.as_str().parse::<Direction>().unwrap(), direction);
        }
        assert!("SIDEWAYS".parse::<Direction>().is_err());
    }

    #[test]
    fn close_reason_round_trip() {
        for reason in [
            CloseReason::TakeProfit,
            CloseReason::StopLoss,
            CloseReason::TrailingStop,
            CloseReason::MaxDuration,
            CloseReason::Manual,
            CloseReason::PnlStagnant,
        ] {
            assert_eq!(reason.as_str().parse::<CloseReason>().unwrap(), reason);
        }
    }

    #[test]
    fn open_record_starts_clean() {
        let record = TradeRecord::open(
            "BTCUSDT",
            "bot-1",
            Direction::Long,
            dec!(100),
            dec!(10),
            Utc::now(),
        );
        assert_eq!(record.status, TradeStatus::Open);
        assert_eq!(record.dca_count, 0);
        assert!(record.exit_price.is_none());
        assert!(record.close_reason.is_none());
        assert!(!record.id.is_empty());
    }

    #[test]
    fn close_patch_sets_terminal_fields() {
        let now = Utc::now();
        let patch = TradePatch::close(dec!(108), now, dec!(80), CloseReason::TrailingStop);
        assert_eq!(patch.status, Some(TradeStatus::Closed));
        assert_eq!(patch.exit_price, Some(dec!(108)));
        assert_eq!(patch.profit_loss, Some(dec!(80)));
        assert_eq!(patch.close_reason, Some(CloseReason::TrailingStop));
        assert!(patch.entry_price.is_none());
    }
}
