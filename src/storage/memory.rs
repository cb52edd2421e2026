//! In-memory journal store.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{JournalStore, PositionSnapshot};
use crate::excursion::MfeMaeRecord;
use crate::trade::Trade;

/// In-memory [`JournalStore`] backed by tokio `RwLock` maps.
///
/// The default store for tests and for callers that keep the journal in the
/// process and persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    trades: RwLock<Vec<Trade>>,
    snapshots: RwLock<Vec<PositionSnapshot>>,
    records: RwLock<HashMap<String, MfeMaeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the broker snapshot set (ingestion-side write path).
    pub async fn set_position_snapshots(&self, snapshots: Vec<PositionSnapshot>) {
        *self.snapshots.write().await = snapshots;
    }

    /// Number of stored excursion records.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl JournalStore for MemoryStore {
    async fn get_trades(&self, underlying: Option<&str>) -> Result<Vec<Trade>> {
        let trades = self.trades.read().await;
        let mut selected: Vec<Trade> = trades
            .iter()
            .filter(|t| underlying.is_none_or(|u| t.underlying == u))
            .cloned()
            .collect();
        selected.sort_by_key(|t| t.timestamp);
        Ok(selected)
    }

    async fn insert_trades(&self, new_trades: &[Trade]) -> Result<usize> {
        let mut trades = self.trades.write().await;
        let mut inserted = 0;
        for trade in new_trades {
            if !trades.iter().any(|t| t.id == trade.id) {
                trades.push(trade.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn get_open_position_snapshots(&self) -> Result<Vec<PositionSnapshot>> {
        Ok(self.snapshots.read().await.clone())
    }

    async fn upsert_mfe_mae_record(&self, record: &MfeMaeRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.trade_id.clone(), record.clone());
        Ok(())
    }

    async fn get_mfe_mae_records(&self, underlying: Option<&str>) -> Result<Vec<MfeMaeRecord>> {
        let records = self.records.read().await;
        let mut selected: Vec<MfeMaeRecord> = records
            .values()
            .filter(|r| underlying.is_none_or(|u| r.underlying == u))
            .cloned()
            .collect();
        selected.sort_by(|a, b| {
            a.entry_date
                .cmp(&b.entry_date)
                .then_with(|| a.trade_id.cmp(&b.trade_id))
        });
        Ok(selected)
    }
}

// ============================================================================
// Tests
// ============================================================================
