//! Excursion (MFE/MAE) analytics.
//!
//! For every round-trip trade the analyzer walks the price path between
//! entry and exit (or "today" for open trades) and records the best and
//! worst unrealized percentage moves along the way, plus how much of the
//! best move the exit actually captured.

mod analyzer;
mod pairing;

pub use analyzer::ExcursionAnalyzer;
pub use pairing::{build_round_trips, RoundTrip};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::trade::InstrumentType;

// ============================================================================
// Direction
// ============================================================================

/// Direction of a round trip: long profits from rising prices, short from
/// falling ones. Excursion signs follow the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeDirection {
    Long,
    Short,
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

// ============================================================================
// MFE/MAE Record
// ============================================================================

/// Excursion analytics for one round-trip trade.
///
/// One record per round trip, keyed by `trade_id` (the id of the entry
/// trade); recalculation overwrites in place, never appends. For open
/// trades the exit fields are `None` and mfe/mae are running values up to
/// the latest available bar.
///
/// Invariant: `mae_pct <= 0 <= mfe_pct` whenever both are defined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfeMaeRecord {
    /// Id of the entry trade (upsert key)
    pub trade_id: String,
    /// Traded symbol
    pub symbol: String,
    /// Root underlying symbol
    pub underlying: String,
    /// Stock or option
    pub instrument: InstrumentType,
    /// Long or short
    pub direction: TradeDirection,
    /// Entry date
    pub entry_date: NaiveDate,
    /// Entry price
    pub entry_price: f64,
    /// Exit date (`None` while the trade is open)
    pub exit_date: Option<NaiveDate>,
    /// Exit price (`None` while the trade is open)
    pub exit_price: Option<f64>,
    /// Maximum favorable excursion, percent (`None` on data gaps)
    pub mfe_pct: Option<f64>,
    /// Maximum adverse excursion, percent (`None` on data gaps)
    pub mae_pct: Option<f64>,
    /// Realized return percent (`None` until closed)
    pub realized_pnl_pct: Option<f64>,
    /// Realized return / MFE. Defined only for closed stock trades whose
    /// MFE is positive; permanently `None` for option trades (excursions on
    /// decaying multi-leg instruments are not comparable to realized capture)
    pub trade_efficiency: Option<f64>,
    /// Calendar days between entry and exit (or today)
    pub holding_days: i64,
    /// When this record was computed. Provenance only; excluded from
    /// equality so recomputation with unchanged inputs compares equal.
    pub calculated_at: DateTime<Utc>,
}

impl MfeMaeRecord {
    /// Whether the underlying round trip has closed.
    pub fn is_closed(&self) -> bool {
        self.exit_date.is_some()
    }

    /// Whether the excursion walk succeeded (no data gap).
    pub fn has_excursions(&self) -> bool {
        self.mfe_pct.is_some() && self.mae_pct.is_some()
    }

    /// A closed record with excursions needs no recomputation.
    pub fn is_complete(&self) -> bool {
        self.is_closed() && self.has_excursions()
    }
}

impl PartialEq for MfeMaeRecord {
    fn eq(&self, other: &Self) -> bool {
        self.trade_id == other.trade_id
            && self.symbol == other.symbol
            && self.underlying == other.underlying
            && self.instrument == other.instrument
            && self.direction == other.direction
            && self.entry_date == other.entry_date
            && self.entry_price == other.entry_price
            && self.exit_date == other.exit_date
            && self.exit_price == other.exit_price
            && self.mfe_pct == other.mfe_pct
            && self.mae_pct == other.mae_pct
            && self.realized_pnl_pct == other.realized_pnl_pct
            && self.trade_efficiency == other.trade_efficiency
            && self.holding_days == other.holding_days
    }
}

// ============================================================================
// Tests
// ============================================================================
