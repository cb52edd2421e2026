//! Consolidated positions.
//!
//! A [`Position`] is the stateless, per-underlying consolidation of the full
//! trade history: net stock quantity with weighted-average cost, the
//! currently-open option legs, realized P&L, and the inferred strategy with
//! its risk tier. Positions are recomputed in full on every request; there
//! is no incremental state to invalidate.

mod aggregator;
mod classifier;

pub use aggregator::PositionAggregator;
pub use classifier::{classify, Classification, StrategyClassifier, StrategyShape};

use serde::{Deserialize, Serialize};

use crate::trade::OptionLeg;

// ============================================================================
// Risk Tier
// ============================================================================

/// Coarse qualitative loss-exposure tier for a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::VeryHigh => write!(f, "Very High"),
        }
    }
}

// ============================================================================
// Position
// ============================================================================

/// One consolidated position per underlying.
///
/// Emitted only when the underlying has a nonzero stock quantity or at least
/// one open option leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Root underlying symbol
    pub underlying: String,
    /// Net stock quantity (signed; zero for pure option positions)
    pub quantity: f64,
    /// Weighted-average stock cost (zero when flat)
    pub avg_cost: f64,
    /// Current price, externally supplied
    pub current_price: f64,
    /// Unrealized P&L of the stock leg
    pub unrealized_pnl: f64,
    /// Realized P&L summed verbatim over all trades for this underlying
    pub realized_pnl: f64,
    /// Currently-open option legs, in first-traded order
    pub legs: Vec<OptionLeg>,
    /// Inferred strategy label
    pub strategy: String,
    /// Risk tier for the inferred strategy
    pub risk_level: RiskLevel,
}

impl Position {
    /// Market value of the stock leg.
    pub fn market_value(&self) -> f64 {
        self.current_price * self.quantity
    }

    /// Cost basis of the stock leg.
    pub fn cost_basis(&self) -> f64 {
        self.avg_cost * self.quantity
    }

    /// Unrealized gain/loss percentage on the stock leg.
    pub fn unrealized_pnl_pct(&self) -> f64 {
        let basis = self.cost_basis().abs();
        if basis > 0.0 {
            (self.unrealized_pnl / basis) * 100.0
        } else {
            0.0
        }
    }

    /// Whether the position has any open option legs.
    pub fn has_options(&self) -> bool {
        !self.legs.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_position(qty: f64, avg_cost: f64, current: f64) -> Position {
        Position {
            underlying: "TEST".to_string(),
            quantity: qty,
            avg_cost,
            current_price: current,
            unrealized_pnl: (current - avg_cost) * qty,
            realized_pnl: 0.0,
            legs: Vec::new(),
            strategy: "Pure Stock Position".to_string(),
            risk_level: RiskLevel::Low,
        }
    }

    #[test]
    fn test_position_value_helpers() {
        let position = make_test_position(100.0, 100.0, 120.0);

        assert!((position.market_value() - 12000.0).abs() < 0.01);
        assert!((position.cost_basis() - 10000.0).abs() < 0.01);
        assert!((position.unrealized_pnl - 2000.0).abs() < 0.01);
        assert!((position.unrealized_pnl_pct() - 20.0).abs() < 0.01);
    }

    #[test]
    fn test_unrealized_invariant() {
        let position = make_test_position(-50.0, 80.0, 75.0);
        // Short 50 @ 80, now 75: unrealized = (75 - 80) * -50 = +250
        assert!(
            (position.unrealized_pnl - (position.current_price - position.avg_cost) * position.quantity)
                .abs()
                < 1e-9
        );
        assert!((position.unrealized_pnl - 250.0).abs() < 0.01);
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::VeryHigh);
        assert_eq!(RiskLevel::VeryHigh.to_string(), "Very High");
    }
}
