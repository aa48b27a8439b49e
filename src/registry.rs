//! Process-wide registry of running bots: at most one engine per symbol.
//!
//! The registry is an owned component wired up with its collaborators at
//! construction; whatever hosts an outer API holds it by reference.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::api::ExchangeClient;
use crate::bot::Bot;
use crate::db::TradeStore;
use crate::error::BotError;
use crate::models::{BotConfig, CloseReason};
use crate::scheduler::TickDriver;
use crate::stats::StatsReport;
use crate::strategy::DirectionSignal;

/// Outcome of a stop request. A timeout means the scheduler is cancelled
/// but the in-flight tick was still running when the deadline hit; the
/// position may remain open.
#[derive(Debug, Clone, Copy)]
pub struct StopSummary {
    pub position_closed: bool,
    pub timed_out: bool,
}

/// Read-only view of one symbol's bot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    pub symbol: String,
    pub running: bool,
    pub uptime_secs: i64,
    pub stats: Option<StatsReport>,
}

struct BotHandle {
    core: Arc<Mutex<Bot>>,
    staged_config: Arc<RwLock<Option<BotConfig>>>,
    driver: TickDriver,
    started_at: DateTime<Utc>,
}

impl BotHandle {
    /// Stop sequence: cancel the driver, then — within the timeout — wait
    /// for an in-flight tick, close any open position with reason MANUAL and
    /// flush queued store writes. On timeout the winding-down future is
    /// dropped; the detached tick still finishes on its own.
    async fn shutdown(self, stop_timeout: Duration) -> StopSummary {
        let BotHandle { core, driver, .. } = self;
        driver.cancel();

        let wind_down = async move {
            driver.join().await;
            let mut bot = core.lock().await;
            let position_closed = if bot.has_open_position() {
                match bot.close_position(CloseReason::Manual, None).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "manual close on stop failed");
                        false
                    }
                }
            } else {
                false
            };
            bot.flush_pending_writes().await;
            position_closed
        };

        match tokio::time::timeout(stop_timeout, wind_down).await {
            Ok(position_closed) => StopSummary {
                position_closed,
                timed_out: false,
            },
            Err(_) => StopSummary {
                position_closed: false,
                timed_out: true,
            },
        }
    }
}

pub struct BotRegistry {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<TradeStore>,
    signal: Arc<dyn DirectionSignal>,
    tick_period: Duration,
    stop_timeout: Duration,
    bots: Mutex<HashMap<String, BotHandle>>,
}

impl BotRegistry {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<TradeStore>,
        signal: Arc<dyn DirectionSignal>,
        tick_period: Duration,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            exchange,
            store,
            signal,
            tick_period,
            stop_timeout,
            bots: Mutex::new(HashMap::new()),
        }
    }

    /// Start a bot for a symbol. The map lock is held across initialization,
    /// so a concurrent start of the same symbol cannot race past the
    /// AlreadyRunning check; the entry is only inserted once initialization
    /// succeeded.
    pub async fn start(&self, symbol: &str, config: BotConfig) -> Result<(), BotError> {
        config.validate()?;

        let mut bots = self.bots.lock().await;
        if bots.contains_key(symbol) {
            return Err(BotError::AlreadyRunning(symbol.to_string()));
        }

        let bot_id = self.store.ensure_bot_id(symbol).await?;
        let staged_config = Arc::new(RwLock::new(None));
        let mut bot = Bot::new(
            symbol,
            &bot_id,
            config,
            staged_config.clone(),
            self.exchange.clone(),
            self.store.clone(),
            self.signal.clone(),
        );
        bot.initialize().await?;

        let core = Arc::new(Mutex::new(bot));
        let driver = TickDriver::spawn(symbol.to_string(), core.clone(), self.tick_period);

        bots.insert(
            symbol.to_string(),
            BotHandle {
                core,
                staged_config,
                driver,
                started_at: Utc::now(),
            },
        );

        info!(%symbol, "bot started");
        Ok(())
    }

    /// Stop a bot. Future ticks are cancelled immediately; the close-out is
    /// bounded by the registry's stop timeout and its outcome surfaced in
    /// the summary. The entry is removed in both outcomes — after a timeout
    /// the scheduler is already dead and keeping the entry would wedge the
    /// symbol.
    pub async fn stop(&self, symbol: &str) -> Result<StopSummary, BotError> {
        let mut bots = self.bots.lock().await;
        let handle = bots
            .remove(symbol)
            .ok_or_else(|| BotError::NotRunning(symbol.to_string()))?;

        let summary = handle.shutdown(self.stop_timeout).await;
        if summary.timed_out {
            warn!(
                %symbol,
                "stop timed out; scheduler cancelled but the position may remain open"
            );
        } else {
            info!(%symbol, position_closed = summary.position_closed, "bot stopped");
        }
        Ok(summary)
    }

    /// Stop every running bot, in no particular order.
    pub async fn stop_all(&self) -> Vec<(String, StopSummary)> {
        let symbols = self.running_symbols().await;
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Ok(summary) = self.stop(&symbol).await {
                results.push((symbol, summary));
            }
        }
        results
    }

    pub async fn running_symbols(&self) -> Vec<String> {
        self.bots.lock().await.keys().cloned().collect()
    }

    /// Read-only snapshot for one symbol. An unknown symbol reports
    /// `running: false` rather than an error.
    pub async fn status(&self, symbol: &str) -> BotStatus {
        let bots = self.bots.lock().await;
        match bots.get(symbol) {
            None => BotStatus {
                symbol: symbol.to_string(),
                running: false,
                uptime_secs: 0,
                stats: None,
            },
            Some(handle) => snapshot(symbol, handle).await,
        }
    }

    /// Read-only snapshots for every running bot.
    pub async fn status_all(&self) -> Vec<BotStatus> {
        let bots = self.bots.lock().await;
        let mut statuses = Vec::with_capacity(bots.len());
        for (symbol, handle) in bots.iter() {
            statuses.push(snapshot(symbol, handle).await);
        }
        statuses
    }

    pub async fn get_stats(&self, symbol: &str) -> Result<StatsReport, BotError> {
        let bots = self.bots.lock().await;
        let handle = bots
            .get(symbol)
            .ok_or_else(|| BotError::NotRunning(symbol.to_string()))?;
        let bot = handle.core.lock().await;
        Ok(bot.status_report())
    }

    /// Validate and persist a configuration; a running bot picks it up at
    /// the top of its next tick. Saving for a stopped symbol succeeds and
    /// seeds the next start.
    pub async fn update_config(&self, symbol: &str, config: BotConfig) -> Result<(), BotError> {
        config.validate()?;
        self.store.save_config(symbol, &config).await?;

        let bots = self.bots.lock().await;
        if let Some(handle) = bots.get(symbol) {
            *handle.staged_config.write().await = Some(config);
            info!(%symbol, "configuration staged for next tick");
        }
        Ok(())
    }
}

async fn snapshot(symbol: &str, handle: &BotHandle) -> BotStatus {
    let bot = handle.core.lock().await;
    BotStatus {
        symbol: symbol.to_string(),
        running: true,
        uptime_secs: (Utc::now() - handle.started_at).num_seconds(),
        stats: Some(bot.status_report()),
    }
}
