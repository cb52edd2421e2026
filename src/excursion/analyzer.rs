//! The excursion walk itself.

use chrono::{NaiveDate, Utc};
use tracing::warn;

use super::{MfeMaeRecord, RoundTrip, TradeDirection};
use crate::config::EngineConfig;
use crate::market::{DailyBar, PnlPoint};

/// Computes MFE/MAE records from round trips and price data.
///
/// The analyzer is pure with respect to its inputs: the same trip and the
/// same series always yield the same record (timestamps aside). Data gaps
/// degrade mfe/mae to `None` for that record instead of failing; callers
/// retry with a recalculate pass once the provider has backfilled.
#[derive(Debug, Clone)]
pub struct ExcursionAnalyzer {
    max_bar_gap_days: i64,
}

impl ExcursionAnalyzer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_bar_gap_days: config.max_bar_gap_days,
        }
    }

    /// End of the excursion window: exit date for closed trips, today for
    /// open ones.
    pub fn window_end(&self, trip: &RoundTrip, today: NaiveDate) -> NaiveDate {
        trip.exit_date.unwrap_or(today)
    }

    /// Compute the record for a stock round trip from daily OHLC bars.
    ///
    /// Per-bar excursions are relative to the entry price and signed by
    /// direction: longs favor highs and suffer lows, shorts the reverse.
    /// MFE clamps at ≥ 0 and MAE at ≤ 0: a trade that was never in profit
    /// has MFE 0, not a negative "best" excursion.
    pub fn compute_stock(
        &self,
        trip: &RoundTrip,
        bars: &[DailyBar],
        today: NaiveDate,
    ) -> MfeMaeRecord {
        let end = self.window_end(trip, today);
        let mut record = self.base_record(trip, today);

        let mut window: Vec<&DailyBar> = bars
            .iter()
            .filter(|b| b.date >= trip.entry_date && b.date <= end)
            .collect();
        window.sort_by_key(|b| b.date);

        if self.is_gap(
            trip,
            end,
            window.first().map(|b| b.date),
            window.last().map(|b| b.date),
        ) || trip.entry_price <= 0.0
        {
            return record;
        }

        let mut mfe = 0.0_f64;
        let mut mae = 0.0_f64;
        for bar in &window {
            let (favorable, adverse) = match trip.direction {
                TradeDirection::Long => (
                    (bar.high - trip.entry_price) / trip.entry_price * 100.0,
                    (bar.low - trip.entry_price) / trip.entry_price * 100.0,
                ),
                TradeDirection::Short => (
                    (trip.entry_price - bar.low) / trip.entry_price * 100.0,
                    (trip.entry_price - bar.high) / trip.entry_price * 100.0,
                ),
            };
            mfe = mfe.max(favorable);
            mae = mae.min(adverse);
        }

        record.mfe_pct = Some(mfe);
        record.mae_pct = Some(mae);
        if trip.is_closed() {
            record.trade_efficiency = match (record.realized_pnl_pct, mfe > 0.0) {
                (Some(realized), true) => Some(realized / mfe),
                _ => None,
            };
        }
        record
    }

    /// Compute the record for an option round trip from the position's own
    /// P&L-percentage series.
    ///
    /// The series is already signed from the position's perspective, so the
    /// walk is direction-free. Efficiency stays `None` unconditionally for
    /// options.
    pub fn compute_option(
        &self,
        trip: &RoundTrip,
        series: &[PnlPoint],
        today: NaiveDate,
    ) -> MfeMaeRecord {
        let end = self.window_end(trip, today);
        let mut record = self.base_record(trip, today);

        let mut window: Vec<&PnlPoint> = series
            .iter()
            .filter(|p| p.date >= trip.entry_date && p.date <= end)
            .collect();
        window.sort_by_key(|p| p.date);

        if self.is_gap(
            trip,
            end,
            window.first().map(|p| p.date),
            window.last().map(|p| p.date),
        ) {
            return record;
        }

        let mut mfe = 0.0_f64;
        let mut mae = 0.0_f64;
        for point in &window {
            mfe = mfe.max(point.pnl_pct);
            mae = mae.min(point.pnl_pct);
        }

        record.mfe_pct = Some(mfe);
        record.mae_pct = Some(mae);
        record
    }

    /// Skeleton record with pairing fields filled and analytics fields
    /// nulled (the data-gap shape).
    fn base_record(&self, trip: &RoundTrip, today: NaiveDate) -> MfeMaeRecord {
        let end = self.window_end(trip, today);
        MfeMaeRecord {
            trade_id: trip.trade_id.clone(),
            symbol: trip.symbol.clone(),
            underlying: trip.underlying.clone(),
            instrument: trip.instrument,
            direction: trip.direction,
            entry_date: trip.entry_date,
            entry_price: trip.entry_price,
            exit_date: trip.exit_date,
            exit_price: trip.exit_price,
            mfe_pct: None,
            mae_pct: None,
            realized_pnl_pct: if trip.is_closed() {
                trip.realized_pnl_pct()
            } else {
                None
            },
            trade_efficiency: None,
            holding_days: (end - trip.entry_date).num_days(),
            calculated_at: Utc::now(),
        }
    }

    /// A window is a gap when it is empty or its coverage falls short of
    /// the trip boundaries by more than the configured tolerance
    /// (weekends/holidays produce small legitimate lags). Open trips run
    /// to the latest available bar, so only their leading edge is checked.
    fn is_gap(
        &self,
        trip: &RoundTrip,
        end: NaiveDate,
        first: Option<NaiveDate>,
        last: Option<NaiveDate>,
    ) -> bool {
        let (Some(first), Some(last)) = (first, last) else {
            warn!(
                symbol = %trip.symbol,
                trade_id = %trip.trade_id,
                "Empty price window, degrading excursions to null"
            );
            return true;
        };

        let leading = (first - trip.entry_date).num_days();
        let trailing = if trip.is_closed() {
            (end - last).num_days()
        } else {
            0
        };
        if leading > self.max_bar_gap_days || trailing > self.max_bar_gap_days {
            warn!(
                symbol = %trip.symbol,
                trade_id = %trip.trade_id,
                leading,
                trailing,
                "Price window does not cover the trade, degrading excursions to null"
            );
            return true;
        }
        false
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::InstrumentType;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn bar(day: u32, high: f64, low: f64) -> DailyBar {
        DailyBar {
            date: date(day),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
        }
    }

    fn closed_trip(entry_day: u32, entry: f64, exit_day: u32, exit: f64) -> RoundTrip {
        RoundTrip {
            trade_id: "t1".to_string(),
            symbol: "AAPL".to_string(),
            underlying: "AAPL".to_string(),
            instrument: InstrumentType::Stock,
            direction: TradeDirection::Long,
            entry_date: date(entry_day),
            entry_price: entry,
            exit_date: Some(date(exit_day)),
            exit_price: Some(exit),
            leg: None,
        }
    }

    fn analyzer() -> ExcursionAnalyzer {
        ExcursionAnalyzer::new(&EngineConfig::default())
    }

    #[test]
    fn test_closed_long_trip_scenario() {
        // Entry 2024-01-02 @ 100 long, exit 2024-01-10 @ 108; highs reach
        // 112, lows reach 98 -> mfe +12%, mae -2%, realized +8%, eff 0.667
        let trip = closed_trip(2, 100.0, 10, 108.0);
        let bars = vec![
            bar(2, 101.0, 99.0),
            bar(3, 104.0, 98.0),
            bar(4, 112.0, 103.0),
            bar(5, 110.0, 105.0),
            bar(8, 109.0, 104.0),
            bar(9, 108.0, 103.0),
            bar(10, 108.5, 106.0),
        ];

        let record = analyzer().compute_stock(&trip, &bars, date(20));

        assert!((record.mfe_pct.unwrap() - 12.0).abs() < 0.001);
        assert!((record.mae_pct.unwrap() + 2.0).abs() < 0.001);
        assert!((record.realized_pnl_pct.unwrap() - 8.0).abs() < 0.001);
        assert!((record.trade_efficiency.unwrap() - 8.0 / 12.0).abs() < 0.001);
        assert_eq!(record.holding_days, 8);
    }

    #[test]
    fn test_open_trip_running_values() {
        // Open long @ 50, running high 55, running low 48 -> mfe +10%,
        // mae -4%, efficiency null
        let mut trip = closed_trip(2, 50.0, 10, 0.0);
        trip.exit_date = None;
        trip.exit_price = None;

        let bars = vec![bar(2, 51.0, 49.5), bar(3, 55.0, 50.0), bar(4, 52.0, 48.0)];
        let record = analyzer().compute_stock(&trip, &bars, date(4));

        assert!((record.mfe_pct.unwrap() - 10.0).abs() < 0.001);
        assert!((record.mae_pct.unwrap() + 4.0).abs() < 0.001);
        assert!(record.trade_efficiency.is_none());
        assert!(record.realized_pnl_pct.is_none());
        assert!(!record.is_closed());
    }

    #[test]
    fn test_short_trip_excursions_mirror() {
        let mut trip = closed_trip(2, 100.0, 4, 95.0);
        trip.direction = TradeDirection::Short;

        // Low 90 is favorable (+10%), high 103 is adverse (-3%)
        let bars = vec![bar(2, 101.0, 98.0), bar(3, 103.0, 90.0), bar(4, 97.0, 94.0)];
        let record = analyzer().compute_stock(&trip, &bars, date(10));

        assert!((record.mfe_pct.unwrap() - 10.0).abs() < 0.001);
        assert!((record.mae_pct.unwrap() + 3.0).abs() < 0.001);
        // Sold 100, covered 95: +5%, efficiency 0.5
        assert!((record.trade_efficiency.unwrap() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_never_in_profit_clamps_mfe_and_nulls_efficiency() {
        let trip = closed_trip(2, 100.0, 4, 92.0);
        let bars = vec![bar(2, 99.0, 95.0), bar(3, 98.0, 91.0), bar(4, 93.0, 90.0)];

        let record = analyzer().compute_stock(&trip, &bars, date(10));

        // Never above entry: mfe clamps to 0 and efficiency is undefined
        assert!((record.mfe_pct.unwrap()).abs() < 0.001);
        assert!((record.mae_pct.unwrap() + 10.0).abs() < 0.001);
        assert!(record.trade_efficiency.is_none());
        assert!((record.realized_pnl_pct.unwrap() + 8.0).abs() < 0.001);
    }

    #[test]
    fn test_invariant_mae_nonpositive_mfe_nonnegative() {
        let trip = closed_trip(2, 100.0, 10, 120.0);
        // Price never below entry either: mae clamps to 0
        let bars = vec![bar(2, 105.0, 101.0), bar(5, 118.0, 104.0), bar(10, 121.0, 115.0)];

        let record = analyzer().compute_stock(&trip, &bars, date(20));
        let mfe = record.mfe_pct.unwrap();
        let mae = record.mae_pct.unwrap();
        assert!(mae <= 0.0 && 0.0 <= mfe);
        assert!((mae).abs() < 0.001);
    }

    #[test]
    fn test_empty_window_degrades_to_null() {
        let trip = closed_trip(2, 100.0, 10, 108.0);
        let record = analyzer().compute_stock(&trip, &[], date(20));

        assert!(record.mfe_pct.is_none());
        assert!(record.mae_pct.is_none());
        assert!(record.trade_efficiency.is_none());
        // Pairing fields survive the gap
        assert!((record.realized_pnl_pct.unwrap() - 8.0).abs() < 0.001);
        assert_eq!(record.holding_days, 8);
    }

    #[test]
    fn test_stale_window_degrades_to_null() {
        let trip = closed_trip(2, 100.0, 30, 108.0);
        // Bars stop three weeks before the exit
        let bars = vec![bar(2, 101.0, 99.0), bar(3, 104.0, 98.0)];

        let record = analyzer().compute_stock(&trip, &bars, date(31));
        assert!(record.mfe_pct.is_none());
        assert!(record.mae_pct.is_none());
    }

    #[test]
    fn test_weekend_lag_tolerated() {
        // Exit on Sunday the 14th; last bar Friday the 12th (2 days lag)
        let trip = closed_trip(8, 100.0, 14, 105.0);
        let bars = vec![bar(8, 102.0, 99.0), bar(11, 106.0, 101.0), bar(12, 105.5, 103.0)];

        let record = analyzer().compute_stock(&trip, &bars, date(20));
        assert!(record.mfe_pct.is_some());
        assert!((record.mfe_pct.unwrap() - 6.0).abs() < 0.001);
    }

    #[test]
    fn test_option_trip_walks_pnl_series() {
        let mut trip = closed_trip(2, 2.5, 10, 3.0);
        trip.instrument = InstrumentType::Option;

        let series = vec![
            PnlPoint { date: date(2), pnl_pct: -5.0 },
            PnlPoint { date: date(5), pnl_pct: 35.0 },
            PnlPoint { date: date(8), pnl_pct: -12.0 },
            PnlPoint { date: date(10), pnl_pct: 20.0 },
        ];

        let record = analyzer().compute_option(&trip, &series, date(20));

        assert!((record.mfe_pct.unwrap() - 35.0).abs() < 0.001);
        assert!((record.mae_pct.unwrap() + 12.0).abs() < 0.001);
        // Efficiency is not applicable to option trades, by design
        assert!(record.trade_efficiency.is_none());
    }

    #[test]
    fn test_option_gap_degrades_to_null() {
        let mut trip = closed_trip(2, 2.5, 10, 3.0);
        trip.instrument = InstrumentType::Option;

        let record = analyzer().compute_option(&trip, &[], date(20));
        assert!(record.mfe_pct.is_none());
        assert!(record.mae_pct.is_none());
    }

    #[test]
    fn test_recomputation_is_idempotent() {
        let trip = closed_trip(2, 100.0, 10, 108.0);
        let bars = vec![bar(2, 101.0, 99.0), bar(4, 112.0, 98.0), bar(10, 108.5, 106.0)];

        let a = analyzer().compute_stock(&trip, &bars, date(20));
        let b = analyzer().compute_stock(&trip, &bars, date(20));
        assert_eq!(a, b);
    }
}
