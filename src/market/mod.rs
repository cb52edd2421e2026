//! Market-data boundary.
//!
//! The engine never fetches prices itself: callers supply implementations of
//! [`MarketDataProvider`] (daily OHLC history plus option-position P&L
//! series) and [`QuoteProvider`] (current prices). Provider failures are
//! recoverable by design: the engine converts them into data gaps and keeps
//! processing other symbols.

mod cache;
pub mod mock;

pub use cache::{CachedMarketData, CacheStats};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::trade::LegKey;

// ============================================================================
// Bar Types
// ============================================================================

/// One daily OHLC bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    /// Bar date
    pub date: NaiveDate,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
}

/// One point of an option position's mark-to-market P&L series,
/// as a percentage of the entry cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PnlPoint {
    /// Observation date
    pub date: NaiveDate,
    /// P&L percentage relative to entry
    pub pnl_pct: f64,
}

// ============================================================================
// Provider Error
// ============================================================================

/// Errors raised by market-data and quote providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network error (connection failed, DNS, transport)
    #[error("network error: {0}")]
    Network(String),

    /// The bounded fetch timeout elapsed
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// No data available for the requested symbol/window
    #[error("data not available: {0}")]
    DataNotAvailable(String),

    /// Provider rejected the request parameters
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal provider failure
    #[error("provider internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Check if the error is worth retrying on a later pass.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::DataNotAvailable(_)
        )
    }
}

// ============================================================================
// Provider Traits
// ============================================================================

/// Historical price/P&L data source.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name for logging (e.g. "schwab", "yfinance").
    fn name(&self) -> &'static str;

    /// Fetch daily bars for a symbol over `[start, end]` inclusive.
    async fn get_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, ProviderError>;

    /// Fetch an option position's own P&L-percentage series over the window.
    ///
    /// Underlying OHLC excursions are not meaningful for time-decaying,
    /// volatility-sensitive contracts, so option excursions walk this series
    /// instead. Providers without position-level marks keep the default,
    /// which the engine treats as a data gap for the affected records.
    async fn get_option_pnl_series(
        &self,
        underlying: &str,
        leg: LegKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PnlPoint>, ProviderError> {
        let _ = (leg, start, end);
        Err(ProviderError::DataNotAvailable(format!(
            "no option P&L series for {underlying}"
        )))
    }
}

/// Real-time quote source, used for unrealized P&L and running excursions.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Fetch the current price for a symbol.
    async fn get_current_price(&self, symbol: &str) -> Result<f64, ProviderError>;
}

// ============================================================================
// Bounded Fetch
// ============================================================================

/// Run a provider future under a bounded timeout.
///
/// Elapsed timers become [`ProviderError::Timeout`], which the engine treats
/// exactly like any other data gap.
pub async fn fetch_with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(timeout)),
    }
}

// ============================================================================
// Tests
// ============================================================================
