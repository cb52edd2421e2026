//! SQLite journal store.
//!
//! Reference adapter for a local single-user journal file: trades, broker
//! position snapshots, and excursion records, with the upsert-by-trade_id
//! contract enforced by a UNIQUE constraint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{JournalStore, PositionSnapshot};
use crate::excursion::{MfeMaeRecord, TradeDirection};
use crate::trade::{InstrumentType, OptionContract, OptionType, Trade, TradeAction};

// ============================================================================
// Database Schema
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
-- Raw trade fills, immutable once ingested
CREATE TABLE IF NOT EXISTS trades (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    symbol TEXT NOT NULL,
    underlying TEXT NOT NULL,
    action TEXT NOT NULL,
    quantity REAL NOT NULL,
    price REAL NOT NULL,
    commission REAL NOT NULL DEFAULT 0,
    realized_pnl REAL NOT NULL DEFAULT 0,
    instrument TEXT NOT NULL,
    strike REAL,
    expiry TEXT,
    option_type TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_trades_underlying_ts
ON trades(underlying, timestamp);

-- Broker open-position snapshots (price/cost overrides)
CREATE TABLE IF NOT EXISTS position_snapshots (
    symbol TEXT PRIMARY KEY,
    quantity REAL NOT NULL,
    avg_cost REAL NOT NULL,
    current_price REAL NOT NULL,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
);

-- Excursion analytics, one row per round trip
CREATE TABLE IF NOT EXISTS mfe_mae_records (
    trade_id TEXT PRIMARY KEY,
    symbol TEXT NOT NULL,
    underlying TEXT NOT NULL,
    instrument TEXT NOT NULL,
    direction TEXT NOT NULL,
    entry_date TEXT NOT NULL,
    entry_price REAL NOT NULL,
    exit_date TEXT,
    exit_price REAL,
    mfe_pct REAL,
    mae_pct REAL,
    realized_pnl_pct REAL,
    trade_efficiency REAL,
    holding_days INTEGER NOT NULL,
    calculated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mfe_mae_underlying_entry
ON mfe_mae_records(underlying, entry_date);
"#;

const DATE_FMT: &str = "%Y-%m-%d";

// ============================================================================
// SQLite Store
// ============================================================================

/// File-backed [`JournalStore`] on rusqlite.
///
/// The connection sits behind a tokio mutex: journal workloads are small
/// batch reads/writes, so one writer at a time is plenty.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

/// Row counts for monitoring.
#[derive(Debug, Clone)]
pub struct SqliteStoreStats {
    pub trades: usize,
    pub snapshots: usize,
    pub mfe_mae_records: usize,
}

impl SqliteStore {
    /// Open (or create) a journal database at the given path.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open journal db at {}", path.display()))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create journal tables")?;

        info!(path = %path.display(), "Opened journal database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Open the default per-user journal database
    /// (`<data_dir>/journal-engine/journal.db`).
    pub fn open_default() -> Result<Self> {
        let base = dirs::data_dir().context("No platform data directory available")?;
        Self::open(base.join("journal-engine").join("journal.db"))
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Row counts across the journal tables.
    pub async fn stats(&self) -> Result<SqliteStoreStats> {
        let conn = self.conn.lock().await;
        let count = |table: &str| -> Result<usize> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .with_context(|| format!("Failed to count {table}"))
        };
        Ok(SqliteStoreStats {
            trades: count("trades")?,
            snapshots: count("position_snapshots")?,
            mfe_mae_records: count("mfe_mae_records")?,
        })
    }

    /// Replace the broker snapshot set (ingestion-side write path).
    pub async fn set_position_snapshots(&self, snapshots: &[PositionSnapshot]) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM position_snapshots", [])
            .context("Failed to clear snapshots")?;
        for snapshot in snapshots {
            conn.execute(
                "INSERT INTO position_snapshots (symbol, quantity, avg_cost, current_price)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    snapshot.symbol,
                    snapshot.quantity,
                    snapshot.avg_cost,
                    snapshot.current_price
                ],
            )
            .context("Failed to insert snapshot")?;
        }
        Ok(())
    }
}

#[async_trait]
impl JournalStore for SqliteStore {
    async fn get_trades(&self, underlying: Option<&str>) -> Result<Vec<Trade>> {
        let conn = self.conn.lock().await;
        let select = |sql: &str, args: &[&dyn rusqlite::ToSql]| -> Result<Vec<Trade>> {
            let mut stmt = conn.prepare(sql).context("Failed to prepare trade query")?;
            let rows = stmt
                .query_map(args, trade_from_row)
                .context("Failed to query trades")?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read trade rows")
        };

        match underlying {
            Some(u) => select(
                "SELECT id, timestamp, symbol, underlying, action, quantity, price,
                        commission, realized_pnl, instrument, strike, expiry, option_type
                 FROM trades WHERE underlying = ?1 ORDER BY timestamp",
                &[&u],
            ),
            None => select(
                "SELECT id, timestamp, symbol, underlying, action, quantity, price,
                        commission, realized_pnl, instrument, strike, expiry, option_type
                 FROM trades ORDER BY timestamp",
                &[],
            ),
        }
    }

    async fn insert_trades(&self, trades: &[Trade]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .context("Failed to begin trade insert transaction")?;

        let mut inserted = 0;
        for trade in trades {
            let contract = trade.contract;
            let changed = tx
                .execute(
                    "INSERT OR IGNORE INTO trades
                     (id, timestamp, symbol, underlying, action, quantity, price,
                      commission, realized_pnl, instrument, strike, expiry, option_type)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        trade.id,
                        trade.timestamp.to_rfc3339(),
                        trade.symbol,
                        trade.underlying,
                        trade.action.to_string(),
                        trade.quantity,
                        trade.price,
                        trade.commission,
                        trade.realized_pnl,
                        instrument_str(trade.instrument),
                        contract.map(|c| c.strike),
                        contract.map(|c| c.expiry.format(DATE_FMT).to_string()),
                        contract.map(|c| c.option_type.to_string()),
                    ],
                )
                .context("Failed to insert trade")?;
            inserted += changed;
        }

        tx.commit().context("Failed to commit trade inserts")?;
        debug!(inserted, total = trades.len(), "Inserted trades");
        Ok(inserted)
    }

    async fn get_open_position_snapshots(&self) -> Result<Vec<PositionSnapshot>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT symbol, quantity, avg_cost, current_price FROM position_snapshots")
            .context("Failed to prepare snapshot query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PositionSnapshot {
                    symbol: row.get(0)?,
                    quantity: row.get(1)?,
                    avg_cost: row.get(2)?,
                    current_price: row.get(3)?,
                })
            })
            .context("Failed to query snapshots")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read snapshot rows")
    }

    async fn upsert_mfe_mae_record(&self, record: &MfeMaeRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO mfe_mae_records
             (trade_id, symbol, underlying, instrument, direction, entry_date,
              entry_price, exit_date, exit_price, mfe_pct, mae_pct,
              realized_pnl_pct, trade_efficiency, holding_days, calculated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(trade_id) DO UPDATE SET
               symbol = excluded.symbol,
               underlying = excluded.underlying,
               instrument = excluded.instrument,
               direction = excluded.direction,
               entry_date = excluded.entry_date,
               entry_price = excluded.entry_price,
               exit_date = excluded.exit_date,
               exit_price = excluded.exit_price,
               mfe_pct = excluded.mfe_pct,
               mae_pct = excluded.mae_pct,
               realized_pnl_pct = excluded.realized_pnl_pct,
               trade_efficiency = excluded.trade_efficiency,
               holding_days = excluded.holding_days,
               calculated_at = excluded.calculated_at",
            params![
                record.trade_id,
                record.symbol,
                record.underlying,
                instrument_str(record.instrument),
                record.direction.to_string(),
                record.entry_date.format(DATE_FMT).to_string(),
                record.entry_price,
                record.exit_date.map(|d| d.format(DATE_FMT).to_string()),
                record.exit_price,
                record.mfe_pct,
                record.mae_pct,
                record.realized_pnl_pct,
                record.trade_efficiency,
                record.holding_days,
                record.calculated_at.to_rfc3339(),
            ],
        )
        .context("Failed to upsert excursion record")?;
        Ok(())
    }

    async fn get_mfe_mae_records(&self, underlying: Option<&str>) -> Result<Vec<MfeMaeRecord>> {
        let conn = self.conn.lock().await;
        let select = |sql: &str, args: &[&dyn rusqlite::ToSql]| -> Result<Vec<MfeMaeRecord>> {
            let mut stmt = conn.prepare(sql).context("Failed to prepare record query")?;
            let rows = stmt
                .query_map(args, record_from_row)
                .context("Failed to query records")?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read record rows")
        };

        const COLUMNS: &str = "trade_id, symbol, underlying, instrument, direction, entry_date,
              entry_price, exit_date, exit_price, mfe_pct, mae_pct,
              realized_pnl_pct, trade_efficiency, holding_days, calculated_at";

        match underlying {
            Some(u) => select(
                &format!(
                    "SELECT {COLUMNS} FROM mfe_mae_records
                     WHERE underlying = ?1 ORDER BY entry_date, trade_id"
                ),
                &[&u],
            ),
            None => select(
                &format!("SELECT {COLUMNS} FROM mfe_mae_records ORDER BY entry_date, trade_id"),
                &[],
            ),
        }
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

fn instrument_str(instrument: InstrumentType) -> &'static str {
    match instrument {
        InstrumentType::Stock => "STOCK",
        InstrumentType::Option => "OPTION",
    }
}

fn invalid<E: std::fmt::Display>(err: E) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        err.to_string().into(),
    )
}

fn parse_db_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FMT).map_err(invalid)
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    let timestamp: String = row.get(1)?;
    let action: String = row.get(4)?;
    let instrument: String = row.get(9)?;
    let strike: Option<f64> = row.get(10)?;
    let expiry: Option<String> = row.get(11)?;
    let option_type: Option<String> = row.get(12)?;

    let contract = match (strike, expiry, option_type) {
        (Some(strike), Some(expiry), Some(option_type)) => Some(OptionContract {
            strike,
            expiry: parse_db_date(&expiry)?,
            option_type: OptionType::from_str(&option_type)
                .ok_or_else(|| invalid(format!("bad option type {option_type}")))?,
        }),
        _ => None,
    };

    Ok(Trade {
        id: row.get(0)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map_err(invalid)?
            .with_timezone(&Utc),
        symbol: row.get(2)?,
        underlying: row.get(3)?,
        action: TradeAction::from_str(&action)
            .ok_or_else(|| invalid(format!("bad action {action}")))?,
        quantity: row.get(5)?,
        price: row.get(6)?,
        commission: row.get(7)?,
        realized_pnl: row.get(8)?,
        instrument: if instrument == "OPTION" {
            InstrumentType::Option
        } else {
            InstrumentType::Stock
        },
        contract,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MfeMaeRecord> {
    let instrument: String = row.get(3)?;
    let direction: String = row.get(4)?;
    let entry_date: String = row.get(5)?;
    let exit_date: Option<String> = row.get(7)?;
    let calculated_at: String = row.get(14)?;

    Ok(MfeMaeRecord {
        trade_id: row.get(0)?,
        symbol: row.get(1)?,
        underlying: row.get(2)?,
        instrument: if instrument == "OPTION" {
            InstrumentType::Option
        } else {
            InstrumentType::Stock
        },
        direction: if direction == "SHORT" {
            TradeDirection::Short
        } else {
            TradeDirection::Long
        },
        entry_date: parse_db_date(&entry_date)?,
        entry_price: row.get(6)?,
        exit_date: exit_date.as_deref().map(parse_db_date).transpose()?,
        exit_price: row.get(8)?,
        mfe_pct: row.get(9)?,
        mae_pct: row.get(10)?,
        realized_pnl_pct: row.get(11)?,
        trade_efficiency: row.get(12)?,
        holding_days: row.get(13)?,
        calculated_at: DateTime::parse_from_rfc3339(&calculated_at)
            .map_err(invalid)?
            .with_timezone(&Utc),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn make_trade(id: &str, underlying: &str, day: u32) -> Trade {
        Trade {
            id: id.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 15, 30, 0).unwrap(),
            symbol: underlying.to_string(),
            underlying: underlying.to_string(),
            action: TradeAction::Buy,
            quantity: 100.0,
            price: 175.5,
            commission: 1.0,
            realized_pnl: 0.0,
            instrument: InstrumentType::Stock,
            contract: None,
        }
    }

    fn make_option_trade(id: &str) -> Trade {
        Trade {
            id: id.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 3, 14, 30, 0).unwrap(),
            symbol: "AAPL 241220C00185000".to_string(),
            underlying: "AAPL".to_string(),
            action: TradeAction::Sell,
            quantity: -1.0,
            price: 2.35,
            commission: 0.65,
            realized_pnl: 0.0,
            instrument: InstrumentType::Option,
            contract: Some(OptionContract {
                strike: 185.0,
                expiry: NaiveDate::from_ymd_opt(2024, 12, 20).unwrap(),
                option_type: OptionType::Call,
            }),
        }
    }

    fn make_record(trade_id: &str, mfe: Option<f64>) -> MfeMaeRecord {
        MfeMaeRecord {
            trade_id: trade_id.to_string(),
            symbol: "AAPL".to_string(),
            underlying: "AAPL".to_string(),
            instrument: InstrumentType::Stock,
            direction: TradeDirection::Long,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            entry_price: 100.0,
            exit_date: Some(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()),
            exit_price: Some(108.0),
            mfe_pct: mfe,
            mae_pct: mfe.map(|_| -2.0),
            realized_pnl_pct: Some(8.0),
            trade_efficiency: mfe.map(|m| 8.0 / m),
            holding_days: 8,
            calculated_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        }
    }

    fn open_temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("journal.db")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_trade_roundtrip_including_options() {
        let (_dir, store) = open_temp_store();
        let trades = vec![make_trade("t1", "AAPL", 2), make_option_trade("o1")];

        assert_eq!(store.insert_trades(&trades).await.unwrap(), 2);

        let loaded = store.get_trades(Some("AAPL")).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], trades[0]);
        assert_eq!(loaded[1], trades[1]);
    }

    #[tokio::test]
    async fn test_insert_trades_is_idempotent() {
        let (_dir, store) = open_temp_store();
        let trades = vec![make_trade("t1", "AAPL", 2)];

        assert_eq!(store.insert_trades(&trades).await.unwrap(), 1);
        assert_eq!(store.insert_trades(&trades).await.unwrap(), 0);
        assert_eq!(store.stats().await.unwrap().trades, 1);
    }

    #[tokio::test]
    async fn test_upsert_record_overwrites_not_duplicates() {
        let (_dir, store) = open_temp_store();

        store
            .upsert_mfe_mae_record(&make_record("t1", Some(10.0)))
            .await
            .unwrap();
        store
            .upsert_mfe_mae_record(&make_record("t1", Some(12.0)))
            .await
            .unwrap();

        let records = store.get_mfe_mae_records(None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!((records[0].mfe_pct.unwrap() - 12.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_record_null_fields_roundtrip() {
        let (_dir, store) = open_temp_store();
        let mut gap = make_record("t2", None);
        gap.exit_date = None;
        gap.exit_price = None;
        gap.realized_pnl_pct = None;

        store.upsert_mfe_mae_record(&gap).await.unwrap();

        let loaded = store.get_mfe_mae_records(Some("AAPL")).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], gap);
        assert!(loaded[0].mfe_pct.is_none());
        assert!(loaded[0].exit_date.is_none());
    }

    #[tokio::test]
    async fn test_snapshots_roundtrip() {
        let (_dir, store) = open_temp_store();
        let snapshots = vec![PositionSnapshot {
            symbol: "AAPL".to_string(),
            quantity: 100.0,
            avg_cost: 175.5,
            current_price: 182.0,
        }];

        store.set_position_snapshots(&snapshots).await.unwrap();
        let loaded = store.get_open_position_snapshots().await.unwrap();
        assert_eq!(loaded, snapshots);
    }
}
