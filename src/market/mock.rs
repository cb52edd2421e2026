//! Static in-memory market data for tests and offline runs.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{DailyBar, MarketDataProvider, PnlPoint, ProviderError, QuoteProvider};
use crate::trade::LegKey;

/// In-memory [`MarketDataProvider`] + [`QuoteProvider`] fed with fixed data.
///
/// Symbols without registered data return `DataNotAvailable`, which is how
/// gap handling is exercised in tests.
#[derive(Default)]
pub struct StaticMarketData {
    bars: RwLock<HashMap<String, Vec<DailyBar>>>,
    pnl_series: RwLock<HashMap<(String, LegKey), Vec<PnlPoint>>>,
    quotes: RwLock<HashMap<String, f64>>,
}

impl StaticMarketData {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register daily bars for a symbol.
    pub fn set_bars(&self, symbol: &str, bars: Vec<DailyBar>) {
        self.bars
            .write()
            .expect("bars lock poisoned")
            .insert(symbol.to_string(), bars);
    }

    /// Register an option P&L series for a leg.
    pub fn set_pnl_series(&self, underlying: &str, leg: LegKey, series: Vec<PnlPoint>) {
        self.pnl_series
            .write()
            .expect("pnl lock poisoned")
            .insert((underlying.to_string(), leg), series);
    }

    /// Register a current price for a symbol.
    pub fn set_quote(&self, symbol: &str, price: f64) {
        self.quotes
            .write()
            .expect("quotes lock poisoned")
            .insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarketData {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn get_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, ProviderError> {
        let bars = self.bars.read().expect("bars lock poisoned");
        match bars.get(symbol) {
            Some(all) => Ok(all
                .iter()
                .filter(|b| b.date >= start && b.date <= end)
                .copied()
                .collect()),
            None => Err(ProviderError::DataNotAvailable(format!(
                "no bars for {symbol}"
            ))),
        }
    }

    async fn get_option_pnl_series(
        &self,
        underlying: &str,
        leg: LegKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PnlPoint>, ProviderError> {
        let series = self.pnl_series.read().expect("pnl lock poisoned");
        match series.get(&(underlying.to_string(), leg)) {
            Some(all) => Ok(all
                .iter()
                .filter(|p| p.date >= start && p.date <= end)
                .copied()
                .collect()),
            None => Err(ProviderError::DataNotAvailable(format!(
                "no option P&L series for {underlying}"
            ))),
        }
    }
}

#[async_trait]
impl QuoteProvider for StaticMarketData {
    async fn get_current_price(&self, symbol: &str) -> Result<f64, ProviderError> {
        let quotes = self.quotes.read().expect("quotes lock poisoned");
        quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no quote for {symbol}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
