//! Canonical trade types.
//!
//! A [`Trade`] is the immutable, validated form of one broker fill. Trades
//! are created by ingestion (or by [`TradeNormalizer`](normalizer::TradeNormalizer)
//! from raw feed records) and consumed read-only by the aggregation and
//! analytics passes.

mod normalizer;

pub use normalizer::{
    parse_date, parse_timestamp, safe_float, safe_int, FieldRule, NormalizeOutcome, RawTrade,
    SkippedRecord, TradeNormalizer,
};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Trade Types
// ============================================================================

/// Trade side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    /// Parse from a broker action string (e.g. "BUY", "buy", "BOT", "SLD").
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "BOT" | "B" => Some(Self::Buy),
            "SELL" | "SLD" | "S" => Some(Self::Sell),
            _ => None,
        }
    }

    /// Signed direction multiplier: +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Instrument class of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentType {
    Stock,
    Option,
}

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Parse from a broker string ("C", "CALL", "P", "PUT").
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "CALL"),
            Self::Put => write!(f, "PUT"),
        }
    }
}

/// Option contract fields carried on option trades.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    /// Strike price
    pub strike: f64,
    /// Expiration date
    pub expiry: NaiveDate,
    /// Call or put
    pub option_type: OptionType,
}

/// One validated broker fill.
///
/// Immutable: nothing in this engine mutates a trade after creation.
/// `realized_pnl` is whatever the broker reported for this fill; the engine
/// never recomputes realization (the upstream feed is the source of truth).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Stable id (content hash of broker fields when the feed omits one)
    pub id: String,
    /// Execution timestamp
    pub timestamp: DateTime<Utc>,
    /// Traded symbol (option symbols include the contract encoding)
    pub symbol: String,
    /// Root underlying symbol (equals `symbol` for stock trades)
    pub underlying: String,
    /// Buy or sell
    pub action: TradeAction,
    /// Signed quantity: positive for buys, negative for sells
    pub quantity: f64,
    /// Fill price per share/contract
    pub price: f64,
    /// Commission paid (non-negative)
    pub commission: f64,
    /// Realized P&L reported by the broker for this fill
    pub realized_pnl: f64,
    /// Stock or option
    pub instrument: InstrumentType,
    /// Option contract fields (present iff `instrument == Option`)
    pub contract: Option<OptionContract>,
}

impl Trade {
    /// Whether this trade is an option fill.
    pub fn is_option(&self) -> bool {
        self.instrument == InstrumentType::Option
    }

    /// Trade date (UTC calendar date of the execution timestamp).
    pub fn trade_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Leg grouping key for option trades: (strike cents, expiry, type).
    ///
    /// Strikes are keyed in integer cents so equal strikes hash equal.
    pub fn leg_key(&self) -> Option<LegKey> {
        self.contract.map(|c| LegKey {
            strike_cents: (c.strike * 100.0).round() as i64,
            expiry: c.expiry,
            option_type: c.option_type,
        })
    }
}

/// Hashable, orderable grouping key for option legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LegKey {
    pub strike_cents: i64,
    pub expiry: NaiveDate,
    pub option_type: OptionType,
}

impl LegKey {
    /// Strike price in currency units.
    pub fn strike(&self) -> f64 {
        self.strike_cents as f64 / 100.0
    }
}

// ============================================================================
// Option Legs
// ============================================================================

/// A currently-open option leg on a position.
///
/// Ephemeral view derived from the option trades of one underlying that
/// still net to a non-zero quantity; recomputed on every aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionLeg {
    /// Call or put
    pub option_type: OptionType,
    /// Strike price
    pub strike: f64,
    /// Expiration date
    pub expiry: NaiveDate,
    /// Net signed quantity: positive = long, negative = short
    pub net_quantity: f64,
}

impl OptionLeg {
    /// Whether the leg is net long.
    pub fn is_long(&self) -> bool {
        self.net_quantity > 0.0
    }

    /// Whether the leg is net short.
    pub fn is_short(&self) -> bool {
        self.net_quantity < 0.0
    }

    /// Whether the leg is a call.
    pub fn is_call(&self) -> bool {
        self.option_type == OptionType::Call
    }

    /// Whether the leg is a put.
    pub fn is_put(&self) -> bool {
        self.option_type == OptionType::Put
    }
}

impl std::fmt::Display for OptionLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = if self.is_long() { "LONG" } else { "SHORT" };
        write!(
            f,
            "{} {} {} {} @ {:.2}",
            side,
            self.net_quantity.abs(),
            self.option_type,
            self.expiry,
            self.strike
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
