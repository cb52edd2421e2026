//! Engine configuration.
//!
//! All thresholds and policy choices live here so callers can tune them
//! explicitly instead of relying on constants buried in the modules.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Configuration for analytics rollups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Trades with efficiency at or above this are counted as "efficient"
    pub efficiency_threshold: f64,
    /// Trades with MAE at or below this percentage count as "large MAE"
    pub large_mae_threshold_pct: f64,
    /// Minimum closed-trade count before issue/suggestion strings are emitted
    pub min_trades_for_insights: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            efficiency_threshold: 0.5,
            large_mae_threshold_pct: -10.0,
            min_trades_for_insights: 5,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Absolute stock quantity above which a pure stock position is
    /// considered large (risk bumps from Low to Medium)
    pub large_position_threshold: f64,
    /// Treat bare short puts as cash-secured ("Cash-Secured Put", Medium)
    /// rather than naked ("Naked Put", High). Policy choice, not derived.
    pub treat_short_puts_as_cash_secured: bool,
    /// Bounded timeout for market-data and quote fetches, in seconds
    pub fetch_timeout_secs: u64,
    /// A price/P&L series whose last point lags the trade window's end by
    /// more than this many calendar days is treated as a data gap
    pub max_bar_gap_days: i64,
    /// Decimal places used when rounding display totals
    pub display_precision: u32,
    /// Analytics thresholds
    pub analytics: AnalyticsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            large_position_threshold: 1000.0,
            treat_short_puts_as_cash_secured: true,
            fetch_timeout_secs: 10,
            max_bar_gap_days: 5,
            display_precision: 2,
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration. Invalid configuration is the one fatal
    /// error class in the engine.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.large_position_threshold <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "large_position_threshold must be positive".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "fetch_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_bar_gap_days < 0 {
            return Err(EngineError::InvalidConfig(
                "max_bar_gap_days must be non-negative".to_string(),
            ));
        }
        if self.analytics.efficiency_threshold <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "efficiency_threshold must be positive".to_string(),
            ));
        }
        if self.analytics.large_mae_threshold_pct > 0.0 {
            return Err(EngineError::InvalidConfig(
                "large_mae_threshold_pct must be zero or negative".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = EngineConfig::default();
        config.large_position_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_positive_mae_threshold_rejected() {
        let mut config = EngineConfig::default();
        config.analytics.large_mae_threshold_pct = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = EngineConfig::default();
        config.fetch_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
