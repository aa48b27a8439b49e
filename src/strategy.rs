//! Direction selection for new positions.
//!
//! The engine only needs *a* side; how it is picked is injected so a real
//! signal can replace the default without touching the state machine.

use rust_decimal::Decimal;

use crate::models::Direction;

/// Decision seam for choosing the side of a new position.
pub trait DirectionSignal: Send + Sync {
    fn direction(&self, symbol: &str, price: Decimal) -> Direction;
}

/// Placeholder signal: an unbiased coin flip. No market analysis happens
/// here on purpose.
pub struct CoinFlipSignal;

impl DirectionSignal for CoinFlipSignal {
    fn direction(&self, _symbol: &str, _price: Decimal) -> Direction {
        if rand::random::<bool>() {
            Direction::Long
        } else {
            Direction::Short
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn coin_flip_eventually_picks_both_sides() {
        let signal = CoinFlipSignal;
        let mut longs = 0;
        let mut shorts = 0;
        for _ in 0..256 {
            match signal.direction("BTCUSDT", dec!(100)) {
                Direction::Long => longs += 1,
                Direction::Short => shorts += 1,
            }
        }
        assert!(longs > 0 && shorts > 0);
    }
}
