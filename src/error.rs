//! Error taxonomy for the bot.
//!
//! Exchange and store failures are recovered locally (the tick that hit them
//! simply did not act); registry-level errors are surfaced to the caller.

use thiserror::Error;

/// Failure talking to the exchange: transport trouble or an explicit
/// rejection. The engine treats both as "this tick's action did not happen".
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("exchange rejected request: {code}: {message}")]
    Rejected { code: String, message: String },

    #[error("unexpected exchange response: {0}")]
    InvalidResponse(String),

    #[error("missing exchange credential: {0}")]
    Credentials(String),
}

/// Failure in the trade store. Writes that fail after an exchange action
/// already succeeded are queued by the engine, not dropped.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("config serialization failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Top-level error surfaced by the registry operations.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("bot already running for {0}")]
    AlreadyRunning(String),

    #[error("no running bot for {0}")]
    NotRunning(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}
