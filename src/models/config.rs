//! Per-symbol bot configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::BotError;

/// Tunables for one symbol's bot.
///
/// The engine holds a snapshot; updates are staged by the registry and
/// applied at the top of the next tick, never mid-tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotConfig {
    /// Candle timeframe a real signal would consume ("1m", "5m", ...).
    pub timeframe: String,

    /// Leverage applied on the exchange at startup.
    pub leverage: u32,

    /// Starting balance in the settlement currency.
    pub initial_balance: Decimal,

    /// Trailing-stop distance, in percent of the extreme price.
    pub trailing_stop_pct: Decimal,

    /// Maximum number of DCA fills per position.
    pub max_dca_orders: u32,

    /// Adverse move, in percent of the entry price, that arms a DCA fill.
    pub dca_price_step_pct: Decimal,

    /// Size multiplier applied per DCA step.
    pub dca_multiplier: Decimal,

    /// Hard cap on how long a position may stay open.
    pub max_trade_duration_minutes: u64,

    /// Share of a winning trade's PnL credited on top of the raw PnL (0-100).
    pub reinvestment_pct: Decimal,

    /// When false, no new positions are opened; an existing position is
    /// still managed to its close.
    pub enabled: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            timeframe: "1m".to_string(),
            leverage: 10,
            initial_balance: dec!(100),
            trailing_stop_pct: dec!(1),
            max_dca_orders: 3,
            dca_price_step_pct: dec!(1.5),
            dca_multiplier: dec!(1.5),
            max_trade_duration_minutes: 240,
            reinvestment_pct: Decimal::ZERO,
            enabled: true,
        }
    }
}

impl BotConfig {
    /// Check every bound. Fatal to `start` and `configure`.
    pub fn validate(&self) -> Result<(), BotError> {
        if self.leverage < 1 {
            return Err(BotError::Configuration("leverage must be >= 1".into()));
        }
        if self.initial_balance <= Decimal::ZERO {
            return Err(BotError::Configuration(
                "initialBalance must be positive".into(),
            ));
        }
        if self.trailing_stop_pct <= Decimal::ZERO {
            return Err(BotError::Configuration(
                "trailingStopPct must be positive".into(),
            ));
        }
        if self.dca_price_step_pct <= Decimal::ZERO {
            return Err(BotError::Configuration(
                "dcaPriceStepPct must be positive".into(),
            ));
        }
        if self.dca_multiplier < Decimal::ONE {
            return Err(BotError::Configuration(
                "dcaMultiplier must be >= 1".into(),
            ));
        }
        if self.max_trade_duration_minutes < 1 {
            return Err(BotError::Configuration(
                "maxTradeDurationMinutes must be >= 1".into(),
            ));
        }
        if self.reinvestment_pct < Decimal::ZERO || self.reinvestment_pct > dec!(100) {
            return Err(BotError::Configuration(
                "reinvestmentPct must be between 0 and 100".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(BotConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_leverage() {
        let config = BotConfig {
            leverage: 0,
            ..BotConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BotError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_non_positive_balance() {
        let config = BotConfig {
            initial_balance: Decimal::ZERO,
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_sub_one_multiplier() {
        let config = BotConfig {
            dca_multiplier: dec!(0.5),
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_reinvestment() {
        let config = BotConfig {
            reinvestment_pct: dec!(101),
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn serde_round_trip() {
        let config = BotConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: BotConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.leverage, config.leverage);
        assert_eq!(back.initial_balance, config.initial_balance);
        assert_eq!(back.enabled, config.enabled);
    }
}
