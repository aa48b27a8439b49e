//! Running and historical performance statistics for one bot.
//!
//! Two computation paths — a full rebuild from persisted trades and an
//! incremental update on each live close — feed the same close-application
//! routine, so they agree bit-for-bit over a common history.

use std::fmt;

use chrono::{DateTime, Duration, Local, Timelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::models::{Direction, TradeRecord, TradeStatus};

pub const HOURS: usize = 24;

#[derive(Debug, Clone)]
pub struct Stats {
    pub total_trades: u64,
    pub win_trades: u64,
    pub loss_trades: u64,
    pub total_pnl: Decimal,
    pub current_balance: Decimal,
    pub initial_balance: Decimal,
    /// Worst peak-to-trough drop of the running balance, in percent.
    pub max_drawdown_pct: Decimal,
    peak_balance: Decimal,
    /// Closes observed in the trailing 24 h (rebuild counts records of any
    /// status entered in that window).
    pub trades_today: u64,
    /// Buckets keyed by local wall-clock hour of the close, date-blind.
    pub hourly_trades: [u64; HOURS],
    pub hourly_pnl: [Decimal; HOURS],
}

impl Stats {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            total_trades: 0,
            win_trades: 0,
            loss_trades: 0,
            total_pnl: Decimal::ZERO,
            current_balance: initial_balance,
            initial_balance,
            max_drawdown_pct: Decimal::ZERO,
            peak_balance: initial_balance,
            trades_today: 0,
            hourly_trades: [0; HOURS],
            hourly_pnl: [Decimal::ZERO; HOURS],
        }
    }

    /// Full recompute from persisted history. Closed trades are replayed in
    /// entry-time order through the same routine the live close path uses.
    pub fn rebuild(
        initial_balance: Decimal,
        reinvestment_pct: Decimal,
        history: &[TradeRecord],
        now: DateTime<Utc>,
    ) -> Self {
        let mut stats = Self::new(initial_balance);

        let cutoff = now - Duration::hours(24);
        stats.trades_today = history.iter().filter(|t| t.entry_time > cutoff).count() as u64;

        let mut closed: Vec<&TradeRecord> = history
            .iter()
            .filter(|t| t.status == TradeStatus::Closed)
            .collect();
        closed.sort_by_key(|t| t.entry_time);

        for trade in closed {
            let pnl = trade.profit_loss.unwrap_or(Decimal::ZERO);
            let exit_time = trade.exit_time.unwrap_or(trade.entry_time);
            stats.record_close(pnl, exit_time, reinvestment_pct);
        }

        stats
    }

    /// Apply one live close event.
    pub fn apply_close(
        &mut self,
        pnl: Decimal,
        exit_time: DateTime<Utc>,
        reinvestment_pct: Decimal,
    ) {
        self.trades_today += 1;
        self.record_close(pnl, exit_time, reinvestment_pct);
    }

    fn record_close(&mut self, pnl: Decimal, exit_time: DateTime<Utc>, reinvestment_pct: Decimal) {
        self.total_trades += 1;
        if pnl > Decimal::ZERO {
            self.win_trades += 1;
        } else if pnl < Decimal::ZERO {
            self.loss_trades += 1;
        }

        self.total_pnl += pnl;
        self.current_balance += pnl;
        if pnl > Decimal::ZERO && reinvestment_pct > Decimal::ZERO {
            self.current_balance += pnl * reinvestment_pct / dec!(100);
        }

        if self.current_balance > self.peak_balance {
            self.peak_balance = self.current_balance;
        }
        let drawdown = (self.peak_balance - self.current_balance) / self.peak_balance * dec!(100);
        if drawdown > self.max_drawdown_pct {
            self.max_drawdown_pct = drawdown;
        }

        let hour = exit_time.with_timezone(&Local).hour() as usize;
        self.hourly_trades[hour] += 1;
        self.hourly_pnl[hour] += pnl;
    }

    pub fn win_rate(&self) -> Decimal {
        if self.total_trades == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.win_trades) / Decimal::from(self.total_trades) * dec!(100)
        }
    }

    pub fn return_percentage(&self) -> Decimal {
        (self.current_balance - self.initial_balance) / self.initial_balance * dec!(100)
    }

    /// Serializable snapshot with the derived fields filled in.
    pub fn report(&self, open_position: Option<OpenPositionView>) -> StatsReport {
        StatsReport {
            total_trades: self.total_trades,
            win_trades: self.win_trades,
            loss_trades: self.loss_trades,
            win_rate: self.win_rate(),
            total_pnl: self.total_pnl,
            current_balance: self.current_balance,
            initial_balance: self.initial_balance,
            return_percentage: self.return_percentage(),
            max_drawdown_pct: self.max_drawdown_pct,
            trades_today: self.trades_today,
            hourly_trades: self.hourly_trades,
            hourly_pnl: self.hourly_pnl,
            open_position,
        }
    }
}

/// Read-model of the currently open position, shown in status snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPositionView {
    pub direction: Direction,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub dca_count: u32,
    pub duration_minutes: i64,
    pub last_price: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
}

/// Point-in-time statistics snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub total_trades: u64,
    pub win_trades: u64,
    pub loss_trades: u64,
    pub win_rate: Decimal,
    pub total_pnl: Decimal,
    pub current_balance: Decimal,
    pub initial_balance: Decimal,
    pub return_percentage: Decimal,
    pub max_drawdown_pct: Decimal,
    pub trades_today: u64,
    pub hourly_trades: [u64; HOURS],
    pub hourly_pnl: [Decimal; HOURS],
    pub open_position: Option<OpenPositionView>,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Bot Statistics ===")?;
        writeln!(
            f,
            "Balance:       ${:.2} (initial ${:.2})",
            self.current_balance, self.initial_balance
        )?;
        writeln!(
            f,
            "Total P&L:     ${:.2} ({:.2}%)",
            self.total_pnl, self.return_percentage
        )?;
        writeln!(
            f,
            "Trades:        {} (W {} / L {}, win rate {:.1}%)",
            self.total_trades, self.win_trades, self.loss_trades, self.win_rate
        )?;
        writeln!(f, "Max Drawdown:  {:.2}%", self.max_drawdown_pct)?;
        writeln!(f, "Trades (24h):  {}", self.trades_today)?;
        if let Some(pos) = &self.open_position {
            writeln!(
                f,
                "Open Position: {} {} @ {:.4} (DCA {}, {} min)",
                pos.direction.as_str(),
                pos.quantity,
                pos.entry_price,
                pos.dca_count,
                pos.duration_minutes
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CloseReason, TradePatch};
    use rust_decimal_macros::dec;

    fn closed_trade(
        pnl: Decimal,
        entry_time: DateTime<Utc>,
        exit_time: DateTime<Utc>,
    ) -> TradeRecord {
        let mut record = TradeRecord::open(
            "BTCUSDT",
            "bot-1",
            Direction::Long,
            dec!(100),
            dec!(10),
            entry_time,
        );
        let patch = TradePatch::close(dec!(100), exit_time, pnl, CloseReason::TrailingStop);
        record.status = TradeStatus::Closed;
        record.exit_price = patch.exit_price;
        record.exit_time = patch.exit_time;
        record.profit_loss = patch.profit_loss;
        record.close_reason = patch.close_reason;
        record
    }

    fn sample_history(now: DateTime<Utc>) -> Vec<TradeRecord> {
        let pnls = [
            dec!(100),
            dec!(-50),
            dec!(200),
            dec!(-30),
            dec!(150),
            dec!(0),
        ];
        pnls.iter()
            .enumerate()
            .map(|(i, &pnl)| {
                let entry = now - Duration::hours(40) + Duration::hours(3 * i as i64);
                closed_trade(pnl, entry, entry + Duration::minutes(90))
            })
            .collect()
    }

    #[test]
    fn rebuild_matches_incremental_updates() {
        let now = Utc::now();
        let history = sample_history(now);
        let reinvestment = dec!(10);

        let rebuilt = Stats::rebuild(dec!(100), reinvestment, &history, now);

        let mut incremental = Stats::new(dec!(100));
        for trade in &history {
            incremental.apply_close(
                trade.profit_loss.unwrap(),
                trade.exit_time.unwrap(),
                reinvestment,
            );
        }

        assert_eq!(rebuilt.total_pnl, incremental.total_pnl);
        assert_eq!(rebuilt.current_balance, incremental.current_balance);
        assert_eq!(rebuilt.max_drawdown_pct, incremental.max_drawdown_pct);
        assert_eq!(rebuilt.hourly_pnl, incremental.hourly_pnl);
        assert_eq!(rebuilt.hourly_trades, incremental.hourly_trades);
        assert_eq!(rebuilt.total_trades, incremental.total_trades);
        assert_eq!(rebuilt.win_trades, incremental.win_trades);
        assert_eq!(rebuilt.loss_trades, incremental.loss_trades);
    }

    #[test]
    fn zero_pnl_counts_as_neither_win_nor_loss() {
        let now = Utc::now();
        let history = sample_history(now);
        let stats = Stats::rebuild(dec!(100), Decimal::ZERO, &history, now);

        assert_eq!(stats.total_trades, 6);
        assert_eq!(stats.win_trades, 3);
        assert_eq!(stats.loss_trades, 2);
        assert_eq!(stats.win_rate(), dec!(50));
    }

    #[test]
    fn drawdown_tracks_worst_peak_to_trough() {
        let mut stats = Stats::new(dec!(100));
        let now = Utc::now();

        // Balance: 200, 250, 170, 150, 250, 300. Peak before the trough is
        // 250, trough 150 -> 40%.
        for pnl in [
            dec!(100),
            dec!(50),
            dec!(-80),
            dec!(-20),
            dec!(100),
            dec!(50),
        ] {
            stats.apply_close(pnl, now, Decimal::ZERO);
        }

        assert_eq!(stats.max_drawdown_pct, dec!(40));
        assert_eq!(stats.current_balance, dec!(300));
    }

    #[test]
    fn reinvestment_inflates_balance_beyond_raw_pnl() {
        let mut stats = Stats::new(dec!(100));
        stats.apply_close(dec!(80), Utc::now(), dec!(50));

        // 100 + 80 + 80 * 50% = 220; total P&L stays the raw 80.
        assert_eq!(stats.current_balance, dec!(220));
        assert_eq!(stats.total_pnl, dec!(80));

        // Losses are never "reinvested".
        stats.apply_close(dec!(-20), Utc::now(), dec!(50));
        assert_eq!(stats.current_balance, dec!(200));
    }

    #[test]
    fn hourly_buckets_cover_all_closes() {
        let now = Utc::now();
        let history = sample_history(now);
        let stats = Stats::rebuild(dec!(100), Decimal::ZERO, &history, now);

        let bucket_total: u64 = stats.hourly_trades.iter().sum();
        let bucket_pnl: Decimal = stats.hourly_pnl.iter().copied().sum();
        assert_eq!(bucket_total, stats.total_trades);
        assert_eq!(bucket_pnl, stats.total_pnl);
    }

    #[test]
    fn win_rate_is_zero_without_trades() {
        let stats = Stats::new(dec!(100));
        assert_eq!(stats.win_rate(), Decimal::ZERO);
        assert_eq!(stats.return_percentage(), Decimal::ZERO);
    }

    #[test]
    fn trades_today_counts_recent_entries_on_rebuild() {
        let now = Utc::now();
        let mut history = sample_history(now);
        // One open trade entered recently also counts.
        history.push(TradeRecord::open(
            "BTCUSDT",
            "bot-1",
            Direction::Long,
            dec!(100),
            dec!(10),
            now - Duration::hours(1),
        ));

        let stats = Stats::rebuild(dec!(100), Decimal::ZERO, &history, now);
        // Entries at -40h, -37h, -34h, -31h, -28h, -25h, -1h: only the last
        // falls inside the trailing 24 h.
        assert_eq!(stats.trades_today, 1);
    }
}
