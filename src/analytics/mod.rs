//! Analytics rollups.
//!
//! Summarizes excursion records into aggregate statistics with
//! deterministic, threshold-derived issue/suggestion strings (no AI; the
//! commentary generator is a separate collaborator), and rolls positions up
//! into portfolio totals.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::AnalyticsConfig;
use crate::excursion::MfeMaeRecord;
use crate::position::Position;

// ============================================================================
// Excursion Analysis
// ============================================================================

/// Aggregate statistics over a set of [`MfeMaeRecord`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcursionAnalysis {
    /// Total records considered
    pub total_records: usize,
    /// Closed round trips
    pub closed_trades: usize,
    /// Still-open round trips
    pub open_trades: usize,
    /// Records whose excursion walk hit a data gap
    pub gap_records: usize,
    /// Mean MFE percent over records with excursions
    pub avg_mfe_pct: Option<f64>,
    /// Mean MAE percent over records with excursions
    pub avg_mae_pct: Option<f64>,
    /// Mean efficiency over closed trades where it is defined
    pub avg_efficiency: Option<f64>,
    /// Mean holding period in days
    pub avg_holding_days: Option<f64>,
    /// Closed trades with efficiency at or above the configured threshold
    pub efficient_trades: usize,
    /// Trades whose MAE is at or below the configured adverse threshold
    pub large_mae_trades: usize,
    /// Deterministic findings derived from the aggregates
    pub issues: Vec<String>,
    /// Deterministic suggestions derived from the aggregates
    pub suggestions: Vec<String>,
}

impl ExcursionAnalysis {
    /// Summarize a record set under the given thresholds.
    pub fn summarize(records: &[MfeMaeRecord], config: &AnalyticsConfig) -> Self {
        let total_records = records.len();
        let closed_trades = records.iter().filter(|r| r.is_closed()).count();
        let open_trades = total_records - closed_trades;
        let gap_records = records.iter().filter(|r| !r.has_excursions()).count();

        let mfes: Vec<f64> = records.iter().filter_map(|r| r.mfe_pct).collect();
        let maes: Vec<f64> = records.iter().filter_map(|r| r.mae_pct).collect();
        let efficiencies: Vec<f64> = records.iter().filter_map(|r| r.trade_efficiency).collect();
        let holding: Vec<f64> = records.iter().map(|r| r.holding_days as f64).collect();

        let efficient_trades = efficiencies
            .iter()
            .filter(|e| **e >= config.efficiency_threshold)
            .count();
        let large_mae_trades = maes
            .iter()
            .filter(|m| **m <= config.large_mae_threshold_pct)
            .count();

        let mut analysis = Self {
            total_records,
            closed_trades,
            open_trades,
            gap_records,
            avg_mfe_pct: mean_of(&mfes),
            avg_mae_pct: mean_of(&maes),
            avg_efficiency: mean_of(&efficiencies),
            avg_holding_days: mean_of(&holding),
            efficient_trades,
            large_mae_trades,
            issues: Vec::new(),
            suggestions: Vec::new(),
        };
        analysis.derive_insights(config, efficiencies.len());
        analysis
    }

    /// Populate issue/suggestion strings from the aggregates. Pure
    /// threshold checks; same inputs, same strings.
    fn derive_insights(&mut self, config: &AnalyticsConfig, rated_trades: usize) {
        if self.closed_trades < config.min_trades_for_insights {
            return;
        }

        if let Some(avg) = self.avg_efficiency {
            if avg < config.efficiency_threshold {
                self.issues.push(format!(
                    "Average trade efficiency {:.2} is below the {:.2} target: exits \
                     capture too little of the available favorable move",
                    avg, config.efficiency_threshold
                ));
                self.suggestions.push(
                    "Review exit timing: trailing the high-water mark or scaling out \
                     near prior peaks would keep more of the move"
                        .to_string(),
                );
            }
        }

        if rated_trades > 0 && self.efficient_trades * 2 < rated_trades {
            self.issues.push(format!(
                "Only {} of {} rated trades reached efficiency {:.2}",
                self.efficient_trades, rated_trades, config.efficiency_threshold
            ));
        }

        if self.closed_trades > 0 && self.large_mae_trades * 10 >= self.closed_trades * 3 {
            self.issues.push(format!(
                "{} of {} closed trades drew down beyond {:.1}% before resolving",
                self.large_mae_trades, self.closed_trades, config.large_mae_threshold_pct
            ));
            self.suggestions.push(
                "Frequent deep adverse excursions: tighter initial stops or smaller \
                 entries would cap the drawdowns"
                    .to_string(),
            );
        }

        if self.gap_records > 0 {
            self.suggestions.push(format!(
                "{} records are missing price history; rerun with recalculate once \
                 the data provider has backfilled",
                self.gap_records
            ));
        }
    }
}

fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().mean())
    }
}

// ============================================================================
// Portfolio Totals
// ============================================================================

/// Portfolio-level sums over consolidated positions.
///
/// Sums are exact per-position sums; rounding happens once, at the fixed
/// display precision, so the totals always reconcile against the rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioTotals {
    /// Number of positions
    pub position_count: usize,
    /// Sum of stock market values
    pub market_value: f64,
    /// Sum of unrealized P&L
    pub unrealized_pnl: f64,
    /// Sum of realized P&L
    pub realized_pnl: f64,
}

impl PortfolioTotals {
    /// Roll positions up into display-rounded totals.
    pub fn from_positions(positions: &[Position], display_precision: u32) -> Self {
        let market_value: f64 = positions.iter().map(|p| p.market_value()).sum();
        let unrealized_pnl: f64 = positions.iter().map(|p| p.unrealized_pnl).sum();
        let realized_pnl: f64 = positions.iter().map(|p| p.realized_pnl).sum();

        Self {
            position_count: positions.len(),
            market_value: round_to(market_value, display_precision),
            unrealized_pnl: round_to(unrealized_pnl, display_precision),
            realized_pnl: round_to(realized_pnl, display_precision),
        }
    }
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10_f64.powi(precision as i32);
    (value * factor).round() / factor
}

// ============================================================================
// Tests
// ============================================================================
