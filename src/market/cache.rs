//! TTL cache for market data.
//!
//! Callers that poll the engine (dashboard refreshes, repeated recalculate
//! passes) can wrap their providers in [`CachedMarketData`] to avoid
//! hammering the upstream API. The cache is an explicit, passed-in object
//! with a stated TTL and an invalidation call, never hidden process-wide
//! state.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::{DailyBar, MarketDataProvider, PnlPoint, ProviderError, QuoteProvider};
use crate::trade::LegKey;

/// Cache entry with expiry.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn new(data: T, ttl_secs: i64) -> Self {
        Self {
            data,
            expires_at: Utc::now() + Duration::seconds(ttl_secs),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Cache hit/entry counts for monitoring.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub bar_entries: usize,
    pub quote_entries: usize,
    pub expired_entries: usize,
}

/// Caching decorator over a [`MarketDataProvider`] and [`QuoteProvider`].
///
/// Daily-bar windows cache under their full (symbol, start, end) key; the
/// option P&L series passes through uncached (position marks are cheap and
/// change with every fill). Quotes get a short TTL of their own. Only
/// successful responses are cached; provider errors always retry.
pub struct CachedMarketData {
    bars_inner: Arc<dyn MarketDataProvider>,
    quotes_inner: Arc<dyn QuoteProvider>,
    bars: RwLock<HashMap<String, CacheEntry<Vec<DailyBar>>>>,
    quotes: RwLock<HashMap<String, CacheEntry<f64>>>,
    bar_ttl_secs: i64,
    quote_ttl_secs: i64,
}

impl CachedMarketData {
    /// Wrap providers with the default TTLs (bars 10 minutes, quotes 30s).
    pub fn new(bars: Arc<dyn MarketDataProvider>, quotes: Arc<dyn QuoteProvider>) -> Self {
        Self::with_ttl(bars, quotes, 600, 30)
    }

    /// Wrap providers with explicit TTLs in seconds.
    pub fn with_ttl(
        bars_inner: Arc<dyn MarketDataProvider>,
        quotes_inner: Arc<dyn QuoteProvider>,
        bar_ttl_secs: i64,
        quote_ttl_secs: i64,
    ) -> Self {
        Self {
            bars_inner,
            quotes_inner,
            bars: RwLock::new(HashMap::new()),
            quotes: RwLock::new(HashMap::new()),
            bar_ttl_secs,
            quote_ttl_secs,
        }
    }

    fn bar_key(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!("{symbol}:{start}:{end}")
    }

    /// Drop all cached entries for a symbol (both bars and quotes).
    pub fn invalidate(&self, symbol: &str) {
        if let Ok(mut bars) = self.bars.write() {
            bars.retain(|key, _| !key.starts_with(&format!("{symbol}:")));
        }
        if let Ok(mut quotes) = self.quotes.write() {
            quotes.remove(symbol);
        }
        debug!(symbol, "Invalidated cached market data");
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        if let Ok(mut bars) = self.bars.write() {
            bars.clear();
        }
        if let Ok(mut quotes) = self.quotes.write() {
            quotes.clear();
        }
    }

    /// Entry counts for monitoring.
    pub fn stats(&self) -> CacheStats {
        let (bar_entries, bars_expired) = self
            .bars
            .read()
            .map(|c| (c.len(), c.values().filter(|e| e.is_expired()).count()))
            .unwrap_or((0, 0));
        let (quote_entries, quotes_expired) = self
            .quotes
            .read()
            .map(|c| (c.len(), c.values().filter(|e| e.is_expired()).count()))
            .unwrap_or((0, 0));

        CacheStats {
            bar_entries,
            quote_entries,
            expired_entries: bars_expired + quotes_expired,
        }
    }
}

#[async_trait]
impl MarketDataProvider for CachedMarketData {
    fn name(&self) -> &'static str {
        "cached"
    }

    async fn get_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, ProviderError> {
        let key = Self::bar_key(symbol, start, end);

        if let Ok(cache) = self.bars.read() {
            if let Some(entry) = cache.get(&key) {
                if !entry.is_expired() {
                    debug!(symbol, "Daily bar cache hit");
                    return Ok(entry.data.clone());
                }
            }
        }

        let bars = self.bars_inner.get_daily_bars(symbol, start, end).await?;
        if let Ok(mut cache) = self.bars.write() {
            cache.insert(key, CacheEntry::new(bars.clone(), self.bar_ttl_secs));
        }
        Ok(bars)
    }

    async fn get_option_pnl_series(
        &self,
        underlying: &str,
        leg: LegKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PnlPoint>, ProviderError> {
        self.bars_inner
            .get_option_pnl_series(underlying, leg, start, end)
            .await
    }
}

#[async_trait]
impl QuoteProvider for CachedMarketData {
    async fn get_current_price(&self, symbol: &str) -> Result<f64, ProviderError> {
        if let Ok(cache) = self.quotes.read() {
            if let Some(entry) = cache.get(symbol) {
                if !entry.is_expired() {
                    return Ok(entry.data);
                }
            }
        }

        let price = self.quotes_inner.get_current_price(symbol).await?;
        if let Ok(mut cache) = self.quotes.write() {
            cache.insert(
                symbol.to_string(),
                CacheEntry::new(price, self.quote_ttl_secs),
            );
        }
        Ok(price)
    }
}

// ============================================================================
// Tests
// ============================================================================
