//! Journal storage boundary.
//!
//! Persistence of trades and analytics records lives outside the engine;
//! [`JournalStore`] is the seam it talks through. Two reference adapters are
//! bundled: [`MemoryStore`] for tests and embedded use, and [`SqliteStore`]
//! for a local single-user journal file.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, SqliteStoreStats};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::excursion::MfeMaeRecord;
use crate::trade::Trade;

/// Broker-reported open-position snapshot.
///
/// Optional overrides for current price and cost basis; when the broker
/// feed provides these the portfolio pass prefers them over derived values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Underlying symbol
    pub symbol: String,
    /// Broker-reported quantity
    pub quantity: f64,
    /// Broker-reported average cost
    pub avg_cost: f64,
    /// Broker-reported current price
    pub current_price: f64,
}

/// Storage seam consumed by the engine.
///
/// Implementations must make `upsert_mfe_mae_record` overwrite in place by
/// `trade_id`: recomputation is idempotent and must never append
/// duplicates. Concurrent upserts for the same id may serialize
/// last-write-wins; different ids never conflict.
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Fetch trades, optionally restricted to one underlying, ordered by
    /// execution timestamp.
    async fn get_trades(&self, underlying: Option<&str>) -> Result<Vec<Trade>>;

    /// Insert trades, ignoring ids already present. Returns the number
    /// actually inserted.
    async fn insert_trades(&self, trades: &[Trade]) -> Result<usize>;

    /// Fetch broker open-position snapshots, if the ingestion layer stores
    /// any.
    async fn get_open_position_snapshots(&self) -> Result<Vec<PositionSnapshot>>;

    /// Insert or overwrite one excursion record, keyed by `trade_id`.
    async fn upsert_mfe_mae_record(&self, record: &MfeMaeRecord) -> Result<()>;

    /// Fetch excursion records, optionally restricted to one underlying,
    /// ordered by entry date.
    async fn get_mfe_mae_records(&self, underlying: Option<&str>) -> Result<Vec<MfeMaeRecord>>;
}
