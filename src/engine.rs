//! The journal engine facade.
//!
//! Wires the storage, market-data, and quote collaborators to the
//! aggregation/classification/excursion passes and exposes the operations
//! the API layer consumes. All collaborators are passed in explicitly;
//! there is no process-wide cached state.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analytics::{ExcursionAnalysis, PortfolioTotals};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::excursion::{build_round_trips, ExcursionAnalyzer, MfeMaeRecord, RoundTrip};
use crate::market::{fetch_with_timeout, MarketDataProvider, QuoteProvider};
use crate::position::{Position, PositionAggregator, StrategyClassifier, StrategyShape};
use crate::storage::JournalStore;
use crate::trade::InstrumentType;

// ============================================================================
// Result Types
// ============================================================================

/// Consolidated portfolio view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    /// One position per underlying, ordered by symbol
    pub positions: Vec<Position>,
    /// Exact per-position sums
    pub totals: PortfolioTotals,
}

/// Outcome of one `calculate_mfe_mae` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfeMaeOutcome {
    /// Records computed and upserted in this pass
    pub calculated: usize,
    /// Round trips skipped because a complete record already existed
    pub skipped: usize,
    /// Underlyings whose price data could not be fetched (their records
    /// carry null excursions and can be retried with `recalculate`)
    pub failed_symbols: Vec<String>,
    /// All stored records in scope after the pass
    pub records: Vec<MfeMaeRecord>,
}

/// Per-underlying fan-out result.
struct SymbolOutcome {
    underlying: String,
    records: Vec<MfeMaeRecord>,
    fetch_failed: bool,
}

// ============================================================================
// Engine
// ============================================================================

/// Stateless, on-demand analytics engine over a trade journal.
///
/// Every operation recomputes from the stored trade history; per-symbol
/// work is independent, and one symbol's data gap never blocks another.
pub struct JournalEngine {
    store: Arc<dyn JournalStore>,
    market_data: Arc<dyn MarketDataProvider>,
    quotes: Arc<dyn QuoteProvider>,
    config: EngineConfig,
    aggregator: PositionAggregator,
    classifier: StrategyClassifier,
    analyzer: ExcursionAnalyzer,
}

impl JournalEngine {
    /// Create an engine over the given collaborators.
    ///
    /// Fails only on invalid configuration.
    pub fn new(
        store: Arc<dyn JournalStore>,
        market_data: Arc<dyn MarketDataProvider>,
        quotes: Arc<dyn QuoteProvider>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let classifier = StrategyClassifier::new(&config);
        let analyzer = ExcursionAnalyzer::new(&config);

        Ok(Self {
            store,
            market_data,
            quotes,
            config,
            aggregator: PositionAggregator::new(),
            classifier,
            analyzer,
        })
    }

    fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.config.fetch_timeout_secs)
    }

    // ------------------------------------------------------------------
    // Portfolio
    // ------------------------------------------------------------------

    /// Consolidate the full trade history into positions with strategy
    /// labels and portfolio totals.
    pub async fn get_portfolio(&self) -> Result<Portfolio> {
        let trades = self.store.get_trades(None).await?;
        let snapshots: HashMap<String, _> = self
            .store
            .get_open_position_snapshots()
            .await?
            .into_iter()
            .map(|s| (s.symbol.clone(), s))
            .collect();

        let mut positions: Vec<Position> =
            self.aggregator.aggregate(&trades).into_values().collect();

        for position in positions.iter_mut() {
            self.price_position(position, snapshots.get(&position.underlying))
                .await;
            if let Some(classification) = self.classifier.classify(&StrategyShape {
                stock_qty: position.quantity,
                current_price: position.current_price,
                legs: &position.legs,
            }) {
                position.strategy = classification.strategy;
                position.risk_level = classification.risk_level;
            }
        }

        let totals = PortfolioTotals::from_positions(&positions, self.config.display_precision);
        info!(
            positions = positions.len(),
            market_value = totals.market_value,
            "Computed portfolio"
        );

        Ok(Portfolio { positions, totals })
    }

    /// Fill in current price and unrealized P&L for one position.
    ///
    /// Preference order: broker snapshot override, live quote, then the
    /// average cost as a flat fallback (unrealized zero) so one dead quote
    /// feed never sinks the whole portfolio.
    async fn price_position(
        &self,
        position: &mut Position,
        snapshot: Option<&crate::storage::PositionSnapshot>,
    ) {
        if let Some(snapshot) = snapshot {
            position.current_price = snapshot.current_price;
            if position.quantity != 0.0 && snapshot.avg_cost > 0.0 {
                position.avg_cost = snapshot.avg_cost;
            }
        } else {
            match fetch_with_timeout(
                self.fetch_timeout(),
                self.quotes.get_current_price(&position.underlying),
            )
            .await
            {
                Ok(price) => position.current_price = price,
                Err(error) => {
                    warn!(
                        underlying = %position.underlying,
                        %error,
                        "Quote fetch failed, pricing position at cost"
                    );
                    position.current_price = position.avg_cost;
                }
            }
        }

        position.unrealized_pnl = if position.quantity != 0.0 {
            (position.current_price - position.avg_cost) * position.quantity
        } else {
            0.0
        };
    }

    // ------------------------------------------------------------------
    // Excursions
    // ------------------------------------------------------------------

    /// Compute MFE/MAE records for one underlying (or all), upserting by
    /// trade id.
    ///
    /// With `recalculate` false, round trips whose stored record is already
    /// complete are skipped. Per-symbol work fans out concurrently; price
    /// fetches run under the configured timeout and failures degrade to
    /// null excursions for the affected records only.
    pub async fn calculate_mfe_mae(
        &self,
        underlying: Option<&str>,
        recalculate: bool,
    ) -> Result<MfeMaeOutcome> {
        let trades = self.store.get_trades(underlying).await?;
        let trips = build_round_trips(&trades);

        let existing: HashMap<String, MfeMaeRecord> = self
            .store
            .get_mfe_mae_records(underlying)
            .await?
            .into_iter()
            .map(|r| (r.trade_id.clone(), r))
            .collect();

        let mut skipped = 0;
        let mut by_underlying: BTreeMap<String, Vec<RoundTrip>> = BTreeMap::new();
        for trip in trips {
            if !recalculate
                && existing
                    .get(&trip.trade_id)
                    .is_some_and(|r| r.is_complete())
            {
                debug!(trade_id = %trip.trade_id, "Record complete, skipping");
                skipped += 1;
                continue;
            }
            by_underlying
                .entry(trip.underlying.clone())
                .or_default()
                .push(trip);
        }

        let today = Utc::now().date_naive();
        let outcomes = join_all(
            by_underlying
                .into_iter()
                .map(|(symbol, trips)| self.process_symbol(symbol, trips, today)),
        )
        .await;

        let mut calculated = 0;
        let mut failed_symbols = Vec::new();
        for outcome in outcomes {
            if outcome.fetch_failed {
                failed_symbols.push(outcome.underlying.clone());
            }
            for record in &outcome.records {
                self.store.upsert_mfe_mae_record(record).await?;
                calculated += 1;
            }
        }

        let records = self.store.get_mfe_mae_records(underlying).await?;
        info!(
            calculated,
            skipped,
            failed = failed_symbols.len(),
            "MFE/MAE pass complete"
        );

        Ok(MfeMaeOutcome {
            calculated,
            skipped,
            failed_symbols,
            records,
        })
    }

    /// Compute all records for one underlying. Provider failures are
    /// contained here: they mark the symbol failed and leave the affected
    /// records with null excursions.
    async fn process_symbol(
        &self,
        underlying: String,
        trips: Vec<RoundTrip>,
        today: NaiveDate,
    ) -> SymbolOutcome {
        let mut records = Vec::with_capacity(trips.len());
        let mut fetch_failed = false;

        let stock_trips: Vec<&RoundTrip> = trips
            .iter()
            .filter(|t| t.instrument == InstrumentType::Stock)
            .collect();
        let option_trips: Vec<(&RoundTrip, crate::trade::LegKey)> = trips
            .iter()
            .filter(|t| t.instrument == InstrumentType::Option)
            .filter_map(|t| t.leg.map(|leg| (t, leg)))
            .collect();

        let stock_window = stock_trips.iter().map(|t| t.entry_date).min().zip(
            stock_trips
                .iter()
                .map(|&t| self.analyzer.window_end(t, today))
                .max(),
        );
        if let Some((start, end)) = stock_window {
            let bars = match fetch_with_timeout(
                self.fetch_timeout(),
                self.market_data.get_daily_bars(&underlying, start, end),
            )
            .await
            {
                Ok(bars) => bars,
                Err(error) => {
                    warn!(%underlying, %error, "Daily bar fetch failed, degrading to data gap");
                    fetch_failed = true;
                    Vec::new()
                }
            };

            for trip in stock_trips {
                records.push(self.analyzer.compute_stock(trip, &bars, today));
            }
        }

        for (trip, leg) in option_trips {
            let end = self.analyzer.window_end(trip, today);
            let series = match fetch_with_timeout(
                self.fetch_timeout(),
                self.market_data
                    .get_option_pnl_series(&underlying, leg, trip.entry_date, end),
            )
            .await
            {
                Ok(series) => series,
                Err(error) => {
                    warn!(
                        %underlying,
                        trade_id = %trip.trade_id,
                        %error,
                        "Option P&L series fetch failed, degrading to data gap"
                    );
                    fetch_failed = true;
                    Vec::new()
                }
            };
            records.push(self.analyzer.compute_option(trip, &series, today));
        }

        SymbolOutcome {
            underlying,
            records,
            fetch_failed,
        }
    }

    // ------------------------------------------------------------------
    // Read-side
    // ------------------------------------------------------------------

    /// Aggregate statistics over all stored excursion records.
    pub async fn get_mfe_mae_stats(&self) -> Result<ExcursionAnalysis> {
        let records = self.store.get_mfe_mae_records(None).await?;
        Ok(ExcursionAnalysis::summarize(
            &records,
            &self.config.analytics,
        ))
    }

    /// Stored excursion records, optionally restricted to one underlying.
    pub async fn get_mfe_mae_records(
        &self,
        underlying: Option<&str>,
    ) -> Result<Vec<MfeMaeRecord>> {
        self.store.get_mfe_mae_records(underlying).await
    }
}

// ============================================================================
// Tests
// ============================================================================
