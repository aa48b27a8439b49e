//! Per-symbol position engine: the open / DCA / trail / close state machine
//! driven once per scheduler tick.
//!
//! Two states: flat (no position) and in-position. Each tick fetches the
//! price once, then either manages the open position (trailing update, close
//! checks in priority order, at most one DCA) or opens a new one. Exchange
//! failures abort the current action only; the next tick retries naturally.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::api::{ExchangeClient, OrderRequest, OrderSide};
use crate::db::TradeStore;
use crate::error::BotError;
use crate::models::{BotConfig, CloseReason, Direction, Position, TradePatch, TradeRecord, TradeStatus};
use crate::stats::{OpenPositionView, Stats, StatsReport};
use crate::strategy::DirectionSignal;

/// A store write that must not be lost. Writes queue up when the store fails
/// after an exchange action already succeeded, and drain in order on later
/// ticks so the persisted record catches up with in-memory state.
#[derive(Debug, Clone)]
enum PendingWrite {
    Create(TradeRecord),
    Patch { id: String, patch: TradePatch },
}

/// One symbol's engine. Owned by its tick driver behind a mutex; only one
/// tick (or a registry-initiated manual close) touches it at a time.
pub struct Bot {
    symbol: String,
    bot_id: String,
    config: BotConfig,
    staged_config: Arc<RwLock<Option<BotConfig>>>,
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<TradeStore>,
    signal: Arc<dyn DirectionSignal>,
    position: Option<Position>,
    stats: Stats,
    pending_writes: VecDeque<PendingWrite>,
    last_price: Option<Decimal>,
}

impl Bot {
    pub fn new(
        symbol: &str,
        bot_id: &str,
        config: BotConfig,
        staged_config: Arc<RwLock<Option<BotConfig>>>,
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<TradeStore>,
        signal: Arc<dyn DirectionSignal>,
    ) -> Self {
        let stats = Stats::new(config.initial_balance);
        Self {
            symbol: symbol.to_string(),
            bot_id: bot_id.to_string(),
            config,
            staged_config,
            exchange,
            store,
            signal,
            position: None,
            stats,
            pending_writes: VecDeque::new(),
            last_price: None,
        }
    }

    /// Set leverage, replay trade history into the stats and recover an OPEN
    /// record into a live position. A leverage rejection fails the start.
    pub async fn initialize(&mut self) -> Result<(), BotError> {
        self.exchange
            .set_leverage(&self.symbol, self.config.leverage)
            .await?;

        let history = self
            .store
            .find_by_symbol_and_bot(&self.symbol, &self.bot_id)
            .await?;

        self.stats = Stats::rebuild(
            self.config.initial_balance,
            self.config.reinvestment_pct,
            &history,
            Utc::now(),
        );

        if let Some(open) = history.iter().find(|t| t.status == TradeStatus::Open) {
            info!(
                symbol = %self.symbol,
                direction = open.direction.as_str(),
                entry_price = %open.entry_price,
                dca_count = open.dca_count,
                "recovered open position"
            );
            self.position = Some(Position::from_record(open, self.config.trailing_stop_pct));
        }

        info!(
            symbol = %self.symbol,
            leverage = self.config.leverage,
            trades = history.len(),
            "bot initialized"
        );
        Ok(())
    }

    /// One evaluation cycle. A ticker failure aborts the tick (logged by the
    /// driver); failures inside open/DCA/close are absorbed per action.
    pub async fn tick(&mut self) -> Result<(), BotError> {
        self.apply_staged_config().await;
        self.flush_pending_writes().await;

        let price = self.exchange.get_ticker(&self.symbol).await?;
        self.last_price = Some(price);
        debug!(symbol = %self.symbol, price = %price, "tick");

        if self.position.is_some() {
            self.manage_position(price).await;
        } else if self.config.enabled {
            self.open_position(price).await;
        }

        Ok(())
    }

    async fn apply_staged_config(&mut self) {
        let staged = self.staged_config.write().await.take();
        if let Some(config) = staged {
            info!(symbol = %self.symbol, "applying updated configuration");
            self.config = config;
        }
    }

    /// Retry queued store writes, oldest first. Stops at the first failure
    /// to preserve write order.
    pub async fn flush_pending_writes(&mut self) {
        while let Some(write) = self.pending_writes.front().cloned() {
            let result = match &write {
                PendingWrite::Create(record) => self.store.create_trade(record).await,
                PendingWrite::Patch { id, patch } => self.store.update_trade(id, patch).await,
            };
            match result {
                Ok(()) => {
                    self.pending_writes.pop_front();
                }
                Err(e) => {
                    warn!(
                        symbol = %self.symbol,
                        queued = self.pending_writes.len(),
                        error = %e,
                        "store still unavailable, keeping queued writes"
                    );
                    break;
                }
            }
        }
    }

    /// Store write that is queued instead of dropped on failure. While
    /// earlier writes are still queued, new ones go straight to the queue so
    /// ordering is preserved.
    async fn persist(&mut self, write: PendingWrite) {
        if !self.pending_writes.is_empty() {
            self.pending_writes.push_back(write);
            return;
        }

        let result = match &write {
            PendingWrite::Create(record) => self.store.create_trade(record).await,
            PendingWrite::Patch { id, patch } => self.store.update_trade(id, patch).await,
        };

        if let Err(e) = result {
            warn!(symbol = %self.symbol, error = %e, "store write failed, queueing for retry");
            self.pending_writes.push_back(write);
        }
    }

    async fn open_position(&mut self, price: Decimal) {
        let direction = self.signal.direction(&self.symbol, price);
        let quantity = self.stats.current_balance * Decimal::from(self.config.leverage) / price;
        let request = OrderRequest::market(&self.symbol, entry_side(direction), quantity);

        if let Err(e) = self.exchange.place_order(&request).await {
            warn!(symbol = %self.symbol, error = %e, "entry order failed");
            return;
        }

        let record = TradeRecord::open(
            &self.symbol,
            &self.bot_id,
            direction,
            price,
            quantity,
            Utc::now(),
        );
        let position = Position::from_record(&record, self.config.trailing_stop_pct);

        info!(
            symbol = %self.symbol,
            direction = direction.as_str(),
            price = %price,
            quantity = %quantity,
            "position opened"
        );

        self.persist(PendingWrite::Create(record)).await;
        self.position = Some(position);
    }

    async fn manage_position(&mut self, price: Decimal) {
        let (trailing_hit, duration_hit, stagnant, dca_due) = {
            let Some(position) = self.position.as_mut() else {
                return;
            };
            position.observe_price(price, self.config.trailing_stop_pct);

            let trailing_hit = position.trailing_breached(price);
            let duration_hit = position.age_minutes(Utc::now())
                >= self.config.max_trade_duration_minutes as i64;
            let stagnant = Self::pnl_stagnant(position);
            let dca_due = position.dca_count < self.config.max_dca_orders
                && position.dca_due(price, self.config.dca_price_step_pct);

            (trailing_hit, duration_hit, stagnant, dca_due)
        };

        // Close conditions win over DCA; first match decides the reason.
        let close_reason = if trailing_hit {
            Some(CloseReason::TrailingStop)
        } else if duration_hit {
            Some(CloseReason::MaxDuration)
        } else if stagnant {
            Some(CloseReason::PnlStagnant)
        } else {
            None
        };

        if let Some(reason) = close_reason {
            if let Err(e) = self.close_position(reason, Some(price)).await {
                warn!(
                    symbol = %self.symbol,
                    reason = reason.as_str(),
                    error = %e,
                    "close attempt failed, position kept"
                );
            }
        } else if dca_due {
            self.place_dca_order(price).await;
        }
    }

    /// PnL-stagnation close trigger. Extension point only: no stagnation
    /// heuristic is defined, so it never fires.
    fn pnl_stagnant(_position: &Position) -> bool {
        false
    }

    async fn place_dca_order(&mut self, price: Decimal) {
        let (fill_size, side, record_id) = match self.position.as_ref() {
            Some(p) => (
                p.next_dca_size(self.config.dca_multiplier),
                entry_side(p.direction),
                p.record_id.clone(),
            ),
            None => return,
        };

        let request = OrderRequest::market(&self.symbol, side, fill_size);
        if let Err(e) = self.exchange.place_order(&request).await {
            warn!(symbol = %self.symbol, error = %e, "DCA order failed");
            return;
        }

        let patch = match self.position.as_mut() {
            Some(position) => {
                position.apply_dca(price, fill_size, self.config.trailing_stop_pct);
                info!(
                    symbol = %self.symbol,
                    fill_price = %price,
                    fill_size = %fill_size,
                    entry_price = %position.entry_price,
                    dca_count = position.dca_count,
                    "DCA fill applied"
                );
                TradePatch::dca(position.entry_price, position.quantity, position.dca_count)
            }
            None => return,
        };
        self.persist(PendingWrite::Patch { id: record_id, patch }).await;
    }

    /// Close the open position. Without an `exit_price` the current ticker
    /// price is fetched. An exchange failure leaves the position untouched;
    /// once the closing order is accepted the close is committed locally even
    /// if the store write has to be queued.
    pub async fn close_position(
        &mut self,
        reason: CloseReason,
        exit_price: Option<Decimal>,
    ) -> Result<(), BotError> {
        let Some(position) = self.position.clone() else {
            return Ok(());
        };

        let exit_price = match exit_price {
            Some(price) => price,
            None => self.exchange.get_ticker(&self.symbol).await?,
        };
        let pnl = position.pnl_at(exit_price);

        let request = OrderRequest::reduce_only(
            &self.symbol,
            exit_side(position.direction),
            position.quantity,
        );
        self.exchange.place_order(&request).await?;

        let exit_time = Utc::now();
        let patch = TradePatch::close(exit_price, exit_time, pnl, reason);
        self.persist(PendingWrite::Patch {
            id: position.record_id.clone(),
            patch,
        })
        .await;

        self.stats
            .apply_close(pnl, exit_time, self.config.reinvestment_pct);

        info!(
            symbol = %self.symbol,
            reason = reason.as_str(),
            exit_price = %exit_price,
            pnl = %pnl,
            balance = %self.stats.current_balance,
            "position closed"
        );

        self.position = None;
        Ok(())
    }

    pub fn has_open_position(&self) -> bool {
        self.position.is_some()
    }

    /// Snapshot for status reads; no side effects.
    pub fn status_report(&self) -> StatsReport {
        let open_position = self.position.as_ref().map(|p| OpenPositionView {
            direction: p.direction,
            entry_price: p.entry_price,
            quantity: p.quantity,
            dca_count: p.dca_count,
            duration_minutes: p.age_minutes(Utc::now()),
            last_price: self.last_price,
            unrealized_pnl: self.last_price.map(|price| p.pnl_at(price)),
        });
        self.stats.report(open_position)
    }

    #[cfg(test)]
    fn pending_write_count(&self) -> usize {
        self.pending_writes.len()
    }
}

fn entry_side(direction: Direction) -> OrderSide {
    match direction {
        Direction::Long => OrderSide::Buy,
        Direction::Short => OrderSide::Sell,
    }
}

fn exit_side(direction: Direction) -> OrderSide {
    match direction {
        Direction::Long => OrderSide::Sell,
        Direction::Short => OrderSide::Buy,
    }
}
