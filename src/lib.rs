//! Journal Engine Library
//!
//! Turns a flat stream of raw buy/sell trade records (stocks and multi-leg
//! options) into consolidated per-underlying positions with an inferred
//! strategy and risk tier, and per-trade excursion (MFE/MAE) analytics
//! computed by walking historical price series.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        journal-engine (library)                     │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────────┐  │
//! │  │  Trade       │  │  Position    │  │  Excursion Analyzer      │  │
//! │  │  Normalizer  │─▶│  Aggregator  │  │  (MFE/MAE engine)        │  │
//! │  └──────────────┘  └──────┬───────┘  └────────────┬─────────────┘  │
//! │                           ▼                       ▼                │
//! │                    ┌──────────────┐       ┌──────────────┐         │
//! │                    │  Strategy    │       │  Analytics   │         │
//! │                    │  Classifier  │       │  Aggregator  │         │
//! │                    └──────────────┘       └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────────┘
//!          ▲                      ▲                      ▲
//!     JournalStore        MarketDataProvider       QuoteProvider
//!     (storage seam)      (OHLC + P&L series)      (current prices)
//! ```
//!
//! # Key Concepts
//!
//! ## Positions
//! The full trade history is re-aggregated on every request: weighted
//! average cost on buys, verbatim realized P&L on sells, option legs netted
//! by (strike, expiry, type). An ordered rule table then labels the
//! combined shape ("Covered Call", "Iron Condor", ...) with a risk tier.
//!
//! ## MFE / MAE
//! For every round trip the engine walks the daily price path between entry
//! and exit (or today) and records the best and worst unrealized percentage
//! moves, plus trade efficiency (how much of the best move the exit
//! captured). Option trips walk the position's own P&L series instead of
//! underlying OHLC.
//!
//! ## Degradation
//! Per-record and per-symbol failures are isolated: malformed records are
//! skipped with a reason, provider gaps null the affected analytics fields,
//! and everything is recomputable once the data backfills.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod analytics;
pub mod config;
pub mod engine;
pub mod error;
pub mod excursion;
pub mod market;
pub mod position;
pub mod storage;
pub mod trade;

pub use analytics::{ExcursionAnalysis, PortfolioTotals};
pub use config::{AnalyticsConfig, EngineConfig};
pub use engine::{JournalEngine, MfeMaeOutcome, Portfolio};
pub use error::{EngineError, ValidationError};
pub use excursion::{build_round_trips, ExcursionAnalyzer, MfeMaeRecord, RoundTrip, TradeDirection};
pub use market::{
    CachedMarketData, DailyBar, MarketDataProvider, PnlPoint, ProviderError, QuoteProvider,
};
pub use position::{Position, PositionAggregator, RiskLevel, StrategyClassifier, StrategyShape};
pub use storage::{JournalStore, MemoryStore, PositionSnapshot, SqliteStore};
pub use trade::{
    InstrumentType, OptionLeg, OptionType, RawTrade, Trade, TradeAction, TradeNormalizer,
};
