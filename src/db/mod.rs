//! SQLite persistence for trade records and per-symbol configuration.
//!
//! Money and timestamps are stored as TEXT so `Decimal` and RFC 3339 times
//! round-trip losslessly; the stats rebuild depends on reading back exactly
//! what was written.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{BotConfig, TradePatch, TradeRecord};

/// Durable record of trades, bot identities and saved configurations.
pub struct TradeStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TradeRow {
    id: String,
    symbol: String,
    bot_id: String,
    direction: String,
    entry_price: String,
    exit_price: Option<String>,
    quantity: String,
    entry_time: String,
    exit_time: Option<String>,
    profit_loss: Option<String>,
    status: String,
    dca_count: i64,
    close_reason: Option<String>,
}

impl TradeStore {
    /// Open (or create) the database and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same `:memory:` instance.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Tear down the pool. Used in tests to simulate a store outage.
    #[cfg(test)]
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                bot_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT,
                quantity TEXT NOT NULL,
                entry_time TEXT NOT NULL,
                exit_time TEXT,
                profit_loss TEXT,
                status TEXT NOT NULL DEFAULT 'OPEN',
                dca_count INTEGER NOT NULL DEFAULT 0,
                close_reason TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bots (
                symbol TEXT PRIMARY KEY,
                bot_id TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bot_configs (
                symbol TEXT PRIMARY KEY,
                config TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_trades_bot_symbol ON trades(bot_id, symbol)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Trades ====================

    /// Insert a freshly opened trade.
    pub async fn create_trade(&self, record: &TradeRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, symbol, bot_id, direction, entry_price, exit_price,
                quantity, entry_time, exit_time, profit_loss, status,
                dca_count, close_reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.symbol)
        .bind(&record.bot_id)
        .bind(record.direction.as_str())
        .bind(record.entry_price.to_string())
        .bind(record.exit_price.map(|p| p.to_string()))
        .bind(record.quantity.to_string())
        .bind(record.entry_time.to_rfc3339())
        .bind(record.exit_time.map(|t| t.to_rfc3339()))
        .bind(record.profit_loss.map(|p| p.to_string()))
        .bind(record.status.as_str())
        .bind(record.dca_count as i64)
        .bind(record.close_reason.map(|r| r.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply a partial update to a trade by id. `None` fields keep their
    /// stored value.
    pub async fn update_trade(&self, id: &str, patch: &TradePatch) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE trades SET
                entry_price = COALESCE(?, entry_price),
                quantity = COALESCE(?, quantity),
                dca_count = COALESCE(?, dca_count),
                status = COALESCE(?, status),
                exit_price = COALESCE(?, exit_price),
                exit_time = COALESCE(?, exit_time),
                profit_loss = COALESCE(?, profit_loss),
                close_reason = COALESCE(?, close_reason)
            WHERE id = ?
            "#,
        )
        .bind(patch.entry_price.map(|p| p.to_string()))
        .bind(patch.quantity.map(|q| q.to_string()))
        .bind(patch.dca_count.map(|c| c as i64))
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.exit_price.map(|p| p.to_string()))
        .bind(patch.exit_time.map(|t| t.to_rfc3339()))
        .bind(patch.profit_loss.map(|p| p.to_string()))
        .bind(patch.close_reason.map(|r| r.as_str()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All trades for one bot on one symbol, oldest entry first.
    pub async fn find_by_symbol_and_bot(
        &self,
        symbol: &str,
        bot_id: &str,
    ) -> Result<Vec<TradeRecord>, StoreError> {
        let rows: Vec<TradeRow> = sqlx::query_as(
            "SELECT * FROM trades WHERE symbol = ? AND bot_id = ? ORDER BY entry_time ASC",
        )
        .bind(symbol)
        .bind(bot_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(to_record).collect()
    }

    // ==================== Bot identity ====================

    /// Stable bot id for a symbol, created on first use. Keeping the id
    /// durable is what makes history replay and open-position recovery work
    /// across restarts.
    pub async fn ensure_bot_id(&self, symbol: &str) -> Result<String, StoreError> {
        if let Some((id,)) =
            sqlx::query_as::<_, (String,)>("SELECT bot_id FROM bots WHERE symbol = ?")
                .bind(symbol)
                .fetch_optional(&self.pool)
                .await?
        {
            return Ok(id);
        }

        sqlx::query("INSERT OR IGNORE INTO bots (symbol, bot_id) VALUES (?, ?)")
            .bind(symbol)
            .bind(Uuid::new_v4().to_string())
            .execute(&self.pool)
            .await?;

        let (id,) = sqlx::query_as::<_, (String,)>("SELECT bot_id FROM bots WHERE symbol = ?")
            .bind(symbol)
            .fetch_one(&self.pool)
            .await?;

        Ok(id)
    }

    // ==================== Configuration ====================

    /// Save (or replace) the configuration for a symbol.
    pub async fn save_config(&self, symbol: &str, config: &BotConfig) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(config)?;

        sqlx::query(
            r#"
            INSERT INTO bot_configs (symbol, config, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(symbol) DO UPDATE SET
                config = excluded.config,
                updated_at = datetime('now')
            "#,
        )
        .bind(symbol)
        .bind(encoded)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Saved configuration for a symbol, if any.
    pub async fn load_config(&self, symbol: &str) -> Result<Option<BotConfig>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT config FROM bot_configs WHERE symbol = ?")
                .bind(symbol)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            None => Ok(None),
            Some((encoded,)) => Ok(Some(serde_json::from_str(&encoded)?)),
        }
    }
}

fn to_record(row: TradeRow) -> Result<TradeRecord, StoreError> {
    let id = row.id.clone();

    Ok(TradeRecord {
        direction: parse_field(&id, "direction", &row.direction)?,
        entry_price: parse_decimal(&id, "entry_price", &row.entry_price)?,
        exit_price: row
            .exit_price
            .as_deref()
            .map(|p| parse_decimal(&id, "exit_price", p))
            .transpose()?,
        quantity: parse_decimal(&id, "quantity", &row.quantity)?,
        entry_time: parse_time(&id, "entry_time", &row.entry_time)?,
        exit_time: row
            .exit_time
            .as_deref()
            .map(|t| parse_time(&id, "exit_time", t))
            .transpose()?,
        profit_loss: row
            .profit_loss
            .as_deref()
            .map(|p| parse_decimal(&id, "profit_loss", p))
            .transpose()?,
        status: parse_field(&id, "status", &row.status)?,
        dca_count: row.dca_count as u32,
        close_reason: row
            .close_reason
            .as_deref()
            .map(|r| parse_field(&id, "close_reason", r))
            .transpose()?,
        id: row.id,
        symbol: row.symbol,
        bot_id: row.bot_id,
    })
}

fn parse_field<T: FromStr<Err = String>>(
    id: &str,
    field: &str,
    raw: &str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|e: String| StoreError::Corrupt {
        id: id.to_string(),
        reason: format!("{field}: {e}"),
    })
}

fn parse_decimal(id: &str, field: &str, raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw).map_err(|e| StoreError::Corrupt {
        id: id.to_string(),
        reason: format!("{field} `{raw}`: {e}"),
    })
}

fn parse_time(id: &str, field: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("{field} `{raw}`: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CloseReason, Direction, TradeStatus};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn sample_record(symbol: &str, bot_id: &str, entry_time: DateTime<Utc>) -> TradeRecord {
        TradeRecord::open(symbol, bot_id, Direction::Long, dec!(100.5), dec!(10), entry_time)
    }

    #[tokio::test]
    async fn create_and_read_back() {
        let store = TradeStore::in_memory().await.unwrap();
        let record = sample_record("BTCUSDT", "bot-1", Utc::now());

        store.create_trade(&record).await.unwrap();

        let trades = store.find_by_symbol_and_bot("BTCUSDT", "bot-1").await.unwrap();
        assert_eq!(trades.len(), 1);
        let loaded = &trades[0];
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.entry_price, dec!(100.5));
        assert_eq!(loaded.quantity, dec!(10));
        assert_eq!(loaded.status, TradeStatus::Open);
        assert_eq!(loaded.entry_time, record.entry_time);
    }

    #[tokio::test]
    async fn patches_apply_in_place() {
        let store = TradeStore::in_memory().await.unwrap();
        let record = sample_record("BTCUSDT", "bot-1", Utc::now());
        store.create_trade(&record).await.unwrap();

        store
            .update_trade(&record.id, &TradePatch::dca(dec!(99.04), dec!(25), 1))
            .await
            .unwrap();

        let closed_at = Utc::now();
        store
            .update_trade(
                &record.id,
                &TradePatch::close(dec!(97), closed_at, dec!(-51), CloseReason::TrailingStop),
            )
            .await
            .unwrap();

        let trades = store.find_by_symbol_and_bot("BTCUSDT", "bot-1").await.unwrap();
        let loaded = &trades[0];
        assert_eq!(loaded.entry_price, dec!(99.04));
        assert_eq!(loaded.quantity, dec!(25));
        assert_eq!(loaded.dca_count, 1);
        assert_eq!(loaded.status, TradeStatus::Closed);
        assert_eq!(loaded.exit_price, Some(dec!(97)));
        assert_eq!(loaded.profit_loss, Some(dec!(-51)));
        assert_eq!(loaded.close_reason, Some(CloseReason::TrailingStop));
    }

    #[tokio::test]
    async fn history_is_ordered_by_entry_time() {
        let store = TradeStore::in_memory().await.unwrap();
        let base = Utc::now();

        // Insert newest first to prove ordering comes from the query.
        for offset in [3, 1, 2] {
            let record = sample_record("BTCUSDT", "bot-1", base + Duration::minutes(offset));
            store.create_trade(&record).await.unwrap();
        }

        let trades = store.find_by_symbol_and_bot("BTCUSDT", "bot-1").await.unwrap();
        let times: Vec<_> = trades.iter().map(|t| t.entry_time).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }

    #[tokio::test]
    async fn bot_id_is_stable_per_symbol() {
        let store = TradeStore::in_memory().await.unwrap();

        let first = store.ensure_bot_id("BTCUSDT").await.unwrap();
        let second = store.ensure_bot_id("BTCUSDT").await.unwrap();
        let other = store.ensure_bot_id("ETHUSDT").await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn config_round_trip() {
        let store = TradeStore::in_memory().await.unwrap();
        assert!(store.load_config("BTCUSDT").await.unwrap().is_none());

        let mut config = BotConfig::default();
        config.leverage = 25;
        config.reinvestment_pct = dec!(50);
        store.save_config("BTCUSDT", &config).await.unwrap();

        let loaded = store.load_config("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(loaded.leverage, 25);
        assert_eq!(loaded.reinvestment_pct, dec!(50));

        config.leverage = 5;
        store.save_config("BTCUSDT", &config).await.unwrap();
        let loaded = store.load_config("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(loaded.leverage, 5);
    }
}
