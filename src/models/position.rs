//! Open-position state for one symbol: VWAP entry, cumulative size,
//! extreme-price tracking and the derived trailing stop.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::trade::{Direction, TradeRecord};

/// Trailing-stop level derived from a reference price: always on the loss
/// side of it for the position's direction.
pub fn trailing_stop_from(direction: Direction, price: Decimal, pct: Decimal) -> Decimal {
    match direction {
        Direction::Long => price * (Decimal::ONE - pct / dec!(100)),
        Direction::Short => price * (Decimal::ONE + pct / dec!(100)),
    }
}

/// Live position owned exclusively by one bot. At most one per symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub direction: Direction,
    /// Volume-weighted average entry across the initial fill and DCA fills.
    pub entry_price: Decimal,
    pub quantity: Decimal,
    /// Size of the entry fill; base for DCA sizing.
    pub initial_quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    pub dca_count: u32,
    /// Highest price seen since open (LONG) or lowest (SHORT).
    pub extreme_price: Decimal,
    pub trailing_stop_price: Decimal,
    /// Linked TradeRecord id for persistence updates.
    pub record_id: String,
}

impl Position {
    /// Build the live position for a trade record, both for a fresh open and
    /// when recovering an OPEN record at startup. The extreme price restarts
    /// at the recorded entry price.
    pub fn from_record(record: &TradeRecord, trailing_stop_pct: Decimal) -> Self {
        Self {
            direction: record.direction,
            entry_price: record.entry_price,
            quantity: record.quantity,
            initial_quantity: record.quantity,
            entry_time: record.entry_time,
            dca_count: record.dca_count,
            extreme_price: record.entry_price,
            trailing_stop_price: trailing_stop_from(
                record.direction,
                record.entry_price,
                trailing_stop_pct,
            ),
            record_id: record.id.clone(),
        }
    }

    /// Track a favorable extreme and tighten the trailing stop from it.
    /// The stop never loosens on this path.
    pub fn observe_price(&mut self, price: Decimal, trailing_stop_pct: Decimal) {
        match self.direction {
            Direction::Long if price > self.extreme_price => {
                self.extreme_price = price;
                self.trailing_stop_price =
                    trailing_stop_from(self.direction, price, trailing_stop_pct);
            }
            Direction::Short if price < self.extreme_price => {
                self.extreme_price = price;
                self.trailing_stop_price =
                    trailing_stop_from(self.direction, price, trailing_stop_pct);
            }
            _ => {}
        }
    }

    /// Price crossed the trailing stop against the position.
    pub fn trailing_breached(&self, price: Decimal) -> bool {
        match self.direction {
            Direction::Long => price < self.trailing_stop_price,
            Direction::Short => price > self.trailing_stop_price,
        }
    }

    /// Price has moved adversely by at least the configured step from the
    /// current average entry.
    pub fn dca_due(&self, price: Decimal, step_pct: Decimal) -> bool {
        match self.direction {
            Direction::Long => price <= self.entry_price * (Decimal::ONE - step_pct / dec!(100)),
            Direction::Short => price >= self.entry_price * (Decimal::ONE + step_pct / dec!(100)),
        }
    }

    /// Size of the next DCA fill: initial quantity scaled by the multiplier
    /// once per step taken so far, plus one for the fill being placed.
    pub fn next_dca_size(&self, multiplier: Decimal) -> Decimal {
        (0..=self.dca_count).fold(self.initial_quantity, |size, _| size * multiplier)
    }

    /// Fold a DCA fill into the position: quantity-weighted average entry,
    /// incremented step count, trailing stop rebased on the new entry.
    pub fn apply_dca(&mut self, fill_price: Decimal, fill_size: Decimal, trailing_stop_pct: Decimal) {
        let total_cost = self.entry_price * self.quantity + fill_price * fill_size;
        self.quantity += fill_size;
        self.entry_price = total_cost / self.quantity;
        self.dca_count += 1;
        self.trailing_stop_price =
            trailing_stop_from(self.direction, self.entry_price, trailing_stop_pct);
    }

    /// PnL of the whole position if it were closed at `price`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        match self.direction {
            Direction::Long => self.quantity * (price - self.entry_price),
            Direction::Short => self.quantity * (self.entry_price - price),
        }
    }

    /// Whole minutes elapsed since the initial open (not reset by DCA).
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entry_time).num_minutes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn long_position(entry: Decimal, quantity: Decimal, trailing_pct: Decimal) -> Position {
        let record = TradeRecord::open("BTCUSDT", "bot-1", Direction::Long, entry, quantity, Utc::now());
        Position::from_record(&record, trailing_pct)
    }

    fn short_position(entry: Decimal, quantity: Decimal, trailing_pct: Decimal) -> Position {
        let record =
            TradeRecord::open("BTCUSDT", "bot-1", Direction::Short, entry, quantity, Utc::now());
        Position::from_record(&record, trailing_pct)
    }

    #[test]
    fn trailing_stop_sides() {
        assert_eq!(
            trailing_stop_from(Direction::Long, dec!(110), dec!(1)),
            dec!(108.90)
        );
        assert_eq!(
            trailing_stop_from(Direction::Short, dec!(100), dec!(1)),
            dec!(101.00)
        );
    }

    #[test]
    fn long_trailing_only_tightens() {
        let mut pos = long_position(dec!(100), dec!(10), dec!(1));
        let mut last_stop = pos.trailing_stop_price;

        for price in [dec!(100), dec!(105), dec!(103), dec!(110), dec!(109)] {
            pos.observe_price(price, dec!(1));
            assert!(pos.trailing_stop_price >= last_stop);
            last_stop = pos.trailing_stop_price;
        }
        assert_eq!(pos.extreme_price, dec!(110));
        assert_eq!(pos.trailing_stop_price, dec!(108.90));
    }

    #[test]
    fn short_trailing_only_tightens_downward() {
        let mut pos = short_position(dec!(100), dec!(10), dec!(1));
        let mut last_stop = pos.trailing_stop_price;

        for price in [dec!(99), dec!(101), dec!(95), dec!(96)] {
            pos.observe_price(price, dec!(1));
            assert!(pos.trailing_stop_price <= last_stop);
            last_stop = pos.trailing_stop_price;
        }
        assert_eq!(pos.extreme_price, dec!(95));
        assert_eq!(pos.trailing_stop_price, dec!(95.95));
    }

    #[test]
    fn breach_is_strict_crossing() {
        let pos = long_position(dec!(100), dec!(10), dec!(1));
        assert!(!pos.trailing_breached(dec!(99))); // exactly at the stop
        assert!(pos.trailing_breached(dec!(98.99)));

        let pos = short_position(dec!(100), dec!(10), dec!(1));
        assert!(!pos.trailing_breached(dec!(101)));
        assert!(pos.trailing_breached(dec!(101.01)));
    }

    #[test]
    fn dca_threshold_is_inclusive() {
        let pos = long_position(dec!(100), dec!(10), dec!(5));
        assert!(!pos.dca_due(dec!(98.6), dec!(1.5)));
        assert!(pos.dca_due(dec!(98.5), dec!(1.5))); // exactly 1.5% adverse
        assert!(pos.dca_due(dec!(98.4), dec!(1.5)));

        let pos = short_position(dec!(100), dec!(10), dec!(5));
        assert!(!pos.dca_due(dec!(101.4), dec!(1.5)));
        assert!(pos.dca_due(dec!(101.5), dec!(1.5)));
    }

    #[test]
    fn dca_fill_sizes_scale_by_multiplier() {
        let mut pos = long_position(dec!(100), dec!(10), dec!(5));
        assert_eq!(pos.next_dca_size(dec!(1.5)), dec!(15.0));

        pos.apply_dca(dec!(98.4), dec!(15), dec!(5));
        assert_eq!(pos.next_dca_size(dec!(1.5)), dec!(22.50));
    }

    #[test]
    fn dca_recomputes_weighted_entry() {
        let mut pos = long_position(dec!(100), dec!(10), dec!(5));
        pos.apply_dca(dec!(98.4), dec!(15), dec!(5));

        assert_eq!(pos.quantity, dec!(25));
        assert_eq!(pos.entry_price, dec!(99.04));
        assert_eq!(pos.dca_count, 1);
        // Stop rebased on the new average entry.
        assert_eq!(pos.trailing_stop_price, dec!(99.04) * dec!(0.95));
        // Initial fill size is untouched.
        assert_eq!(pos.initial_quantity, dec!(10));
    }

    #[test]
    fn pnl_by_direction() {
        let long = long_position(dec!(100), dec!(10), dec!(1));
        assert_eq!(long.pnl_at(dec!(108)), dec!(80));
        assert_eq!(long.pnl_at(dec!(95)), dec!(-50));

        let short = short_position(dec!(100), dec!(10), dec!(1));
        assert_eq!(short.pnl_at(dec!(95)), dec!(50));
        assert_eq!(short.pnl_at(dec!(108)), dec!(-80));
    }

    #[test]
    fn age_counts_whole_minutes() {
        let pos = long_position(dec!(100), dec!(10), dec!(1));
        let later = pos.entry_time + Duration::seconds(359);
        assert_eq!(pos.age_minutes(later), 5);
    }
}
