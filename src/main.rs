//! Automated DCA / trailing-stop bot for Bitget USDT-M perpetual futures.
//!
//! One independent engine per symbol: periodic price sampling, random-side
//! entries, dollar-cost-averaged scaling into adverse moves, trailing-stop
//! and max-duration exits, with running performance statistics.

mod api;
mod bot;
mod db;
mod error;
mod models;
mod registry;
mod scheduler;
mod stats;
mod strategy;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{BitgetClient, ExchangeClient};
use crate::db::TradeStore;
use crate::models::BotConfig;
use crate::registry::BotRegistry;
use crate::stats::Stats;
use crate::strategy::CoinFlipSignal;

/// Bitget DCA bot CLI.
#[derive(Parser)]
#[command(name = "dcabot")]
#[command(about = "Automated DCA / trailing-stop bot for Bitget USDT-M futures", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./dcabot.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start bots for one or more symbols and run until interrupted
    Run {
        /// Symbols to trade (e.g. BTCUSDT_UMCBL)
        symbols: Vec<String>,

        /// Tick interval in seconds
        #[arg(short, long, default_value = "60")]
        interval: u64,

        /// Per-bot graceful-stop timeout in seconds
        #[arg(long, default_value = "30")]
        stop_timeout: u64,
    },

    /// Save per-symbol configuration
    Configure {
        symbol: String,

        #[arg(long, default_value = "1m")]
        timeframe: String,

        #[arg(long, default_value = "10")]
        leverage: u32,

        /// Initial balance in USDT
        #[arg(long, default_value = "100")]
        balance: Decimal,

        /// Trailing-stop distance in percent
        #[arg(long, default_value = "1")]
        trailing_stop: Decimal,

        #[arg(long, default_value = "3")]
        max_dca_orders: u32,

        /// Adverse move per DCA step, in percent
        #[arg(long, default_value = "1.5")]
        dca_step: Decimal,

        #[arg(long, default_value = "1.5")]
        dca_multiplier: Decimal,

        /// Maximum trade duration in minutes
        #[arg(long, default_value = "240")]
        max_duration: u64,

        /// Percent of winning PnL credited on top of the raw PnL
        #[arg(long, default_value = "0")]
        reinvestment: Decimal,

        /// Save the config with trading disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Show the saved configuration for a symbol
    Config { symbol: String },

    /// Show the available futures margin balance
    Balance,

    /// Show recent candles for a symbol
    Candles {
        symbol: String,

        /// Candle granularity (e.g. 1m, 5m, 1H)
        #[arg(short, long, default_value = "1m")]
        interval: String,

        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Show recorded trades and rebuilt statistics for a symbol
    History {
        symbol: String,

        /// Number of most recent trades to list
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = Arc::new(TradeStore::connect(&cli.database).await?);

    match cli.command {
        Commands::Run {
            symbols,
            interval,
            stop_timeout,
        } => {
            if symbols.is_empty() {
                println!("No symbols given. Usage: dcabot run BTCUSDT_UMCBL [more symbols...]");
                return Ok(());
            }

            let exchange: Arc<dyn ExchangeClient> = Arc::new(BitgetClient::from_env()?);
            let registry = BotRegistry::new(
                exchange,
                store.clone(),
                Arc::new(CoinFlipSignal),
                Duration::from_secs(interval),
                Duration::from_secs(stop_timeout),
            );

            for symbol in &symbols {
                let config = store.load_config(symbol).await?.unwrap_or_default();
                match registry.start(symbol, config).await {
                    Ok(()) => println!("Started bot for {symbol}"),
                    Err(e) => eprintln!("Failed to start {symbol}: {e}"),
                }
            }

            let running = registry.running_symbols().await;
            if running.is_empty() {
                anyhow::bail!("no bots started");
            }

            println!("\n=== Bitget DCA Bot ===");
            println!("Symbols:       {}", running.join(", "));
            println!("Tick interval: {interval}s");
            println!("\nPress Ctrl+C to stop.\n");

            tokio::signal::ctrl_c().await?;
            info!("shutdown requested");
            println!("\nStopping bots...");

            for (symbol, summary) in registry.stop_all().await {
                if summary.timed_out {
                    println!("{symbol}: stop timed out, position may remain open");
                } else if summary.position_closed {
                    println!("{symbol}: stopped (position closed)");
                } else {
                    println!("{symbol}: stopped");
                }
            }

            // Final per-symbol stats, rebuilt from the store.
            for symbol in &symbols {
                let config = store.load_config(symbol).await?.unwrap_or_default();
                let bot_id = store.ensure_bot_id(symbol).await?;
                let trades = store.find_by_symbol_and_bot(symbol, &bot_id).await?;
                let stats = Stats::rebuild(
                    config.initial_balance,
                    config.reinvestment_pct,
                    &trades,
                    Utc::now(),
                );
                println!("\n--- {symbol} ---");
                println!("{}", stats.report(None));
            }
        }

        Commands::Configure {
            symbol,
            timeframe,
            leverage,
            balance,
            trailing_stop,
            max_dca_orders,
            dca_step,
            dca_multiplier,
            max_duration,
            reinvestment,
            disabled,
        } => {
            let config = BotConfig {
                timeframe,
                leverage,
                initial_balance: balance,
                trailing_stop_pct: trailing_stop,
                max_dca_orders,
                dca_price_step_pct: dca_step,
                dca_multiplier,
                max_trade_duration_minutes: max_duration,
                reinvestment_pct: reinvestment,
                enabled: !disabled,
            };
            config.validate()?;
            store.save_config(&symbol, &config).await?;
            println!("Configuration saved for {symbol}");
        }

        Commands::Config { symbol } => match store.load_config(&symbol).await? {
            None => println!("No configuration found for {symbol}. Use 'dcabot configure {symbol}'."),
            Some(config) => {
                println!("\n=== Configuration: {symbol} ===");
                println!("Timeframe:        {}", config.timeframe);
                println!("Leverage:         {}x", config.leverage);
                println!("Initial Balance:  ${}", config.initial_balance);
                println!("Trailing Stop:    {}%", config.trailing_stop_pct);
                println!("Max DCA Orders:   {}", config.max_dca_orders);
                println!("DCA Price Step:   {}%", config.dca_price_step_pct);
                println!("DCA Multiplier:   {}x", config.dca_multiplier);
                println!("Max Duration:     {} min", config.max_trade_duration_minutes);
                println!("Reinvestment:     {}%", config.reinvestment_pct);
                println!("Enabled:          {}", config.enabled);
            }
        },

        Commands::Balance => {
            let exchange = BitgetClient::from_env()?;
            let available = exchange.get_balance().await?;
            println!("Available margin balance: ${available}");
        }

        Commands::Candles {
            symbol,
            interval,
            limit,
        } => {
            let exchange = BitgetClient::from_env()?;
            let candles = exchange.get_candles(&symbol, &interval, limit).await?;

            println!(
                "\n{:<16} {:>12} {:>12} {:>12} {:>12} {:>14}",
                "TIMESTAMP", "OPEN", "HIGH", "LOW", "CLOSE", "VOLUME"
            );
            println!("{}", "-".repeat(84));
            for candle in &candles {
                println!(
                    "{:<16} {:>12.4} {:>12.4} {:>12.4} {:>12.4} {:>14.3}",
                    candle.ts, candle.open, candle.high, candle.low, candle.close, candle.volume
                );
            }
        }

        Commands::History { symbol, limit } => {
            let bot_id = store.ensure_bot_id(&symbol).await?;
            let trades = store.find_by_symbol_and_bot(&symbol, &bot_id).await?;

            if trades.is_empty() {
                println!("No trades recorded for {symbol}.");
                return Ok(());
            }

            println!(
                "\n{:<22} {:<6} {:>12} {:>12} {:>10} {:>12} {:<14}",
                "ENTRY TIME", "SIDE", "ENTRY", "EXIT", "QTY", "PNL", "REASON"
            );
            println!("{}", "-".repeat(94));

            for trade in trades.iter().rev().take(limit) {
                println!(
                    "{:<22} {:<6} {:>12.4} {:>12} {:>10.3} {:>12} {:<14}",
                    trade.entry_time.format("%Y-%m-%d %H:%M:%S"),
                    trade.direction.as_str(),
                    trade.entry_price,
                    trade
                        .exit_price
                        .map(|p| format!("{p:.4}"))
                        .unwrap_or_else(|| "-".to_string()),
                    trade.quantity,
                    trade
                        .profit_loss
                        .map(|p| format!("{p:.2}"))
                        .unwrap_or_else(|| "-".to_string()),
                    trade
                        .close_reason
                        .map(|r| r.as_str())
                        .unwrap_or("OPEN"),
                );
            }

            let config = store.load_config(&symbol).await?.unwrap_or_default();
            let stats = Stats::rebuild(
                config.initial_balance,
                config.reinvestment_pct,
                &trades,
                Utc::now(),
            );
            println!("\n{}", stats.report(None));
        }
    }

    Ok(())
}
