//! Round-trip pairing: flat trade history → entry/exit pairs.
//!
//! The excursion walk needs an entry event and, for closed trades, an exit
//! event. Those pairs are derived from the raw fills by the same
//! net-quantity walk the aggregator uses: a zero-to-nonzero move opens a
//! trip, a return to zero closes it, and a sign flip closes the old trip
//! and opens a new one at the flipping trade's price.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::TradeDirection;
use crate::trade::{InstrumentType, LegKey, Trade};

const QTY_EPSILON: f64 = 1e-9;

/// One entry/exit pair (or an open entry) for a single instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTrip {
    /// Id of the entry trade; keys the resulting [`MfeMaeRecord`](super::MfeMaeRecord)
    pub trade_id: String,
    /// Traded symbol
    pub symbol: String,
    /// Root underlying symbol
    pub underlying: String,
    /// Stock or option
    pub instrument: InstrumentType,
    /// Long or short
    pub direction: TradeDirection,
    /// Entry date
    pub entry_date: NaiveDate,
    /// Entry price
    pub entry_price: f64,
    /// Exit date (`None` while open)
    pub exit_date: Option<NaiveDate>,
    /// Exit price (`None` while open)
    pub exit_price: Option<f64>,
    /// Leg key for option trips (`None` for stock)
    pub leg: Option<LegKey>,
}

impl RoundTrip {
    /// Whether the trip has closed.
    pub fn is_closed(&self) -> bool {
        self.exit_date.is_some()
    }

    /// Realized return percent for closed trips, from entry/exit prices and
    /// direction. `None` while open or when the entry price is degenerate.
    pub fn realized_pnl_pct(&self) -> Option<f64> {
        let exit = self.exit_price?;
        if self.entry_price <= 0.0 {
            return None;
        }
        let raw = (exit - self.entry_price) / self.entry_price * 100.0;
        Some(match self.direction {
            TradeDirection::Long => raw,
            TradeDirection::Short => -raw,
        })
    }
}

/// Build round trips from a trade history.
///
/// Stock fills pair per symbol; option fills pair per (underlying, leg).
/// Output is ordered by underlying, then chronologically within it. Partial
/// exits do not close a trip; only a return to flat does, and the closing
/// fill supplies the exit date and price.
pub fn build_round_trips(trades: &[Trade]) -> Vec<RoundTrip> {
    // Grouping key: stock trades by symbol, option trades by leg
    let mut groups: BTreeMap<(String, Option<LegKey>), Vec<&Trade>> = BTreeMap::new();
    for trade in trades {
        let key = match trade.leg_key() {
            Some(leg) => (trade.underlying.clone(), Some(leg)),
            None => (trade.symbol.clone(), None),
        };
        groups.entry(key).or_default().push(trade);
    }

    let mut trips = Vec::new();
    for ((_, leg), mut group) in groups {
        group.sort_by_key(|t| t.timestamp);
        pair_group(&group, leg, &mut trips);
    }
    trips
}

/// Walk one instrument's chronologically-sorted fills.
fn pair_group(trades: &[&Trade], leg: Option<LegKey>, out: &mut Vec<RoundTrip>) {
    let mut qty = 0.0_f64;
    let mut open: Option<RoundTrip> = None;

    for &trade in trades {
        let new_qty = qty + trade.quantity;

        if qty.abs() <= QTY_EPSILON {
            // Opening from flat
            if new_qty.abs() > QTY_EPSILON {
                open = Some(open_trip(trade, new_qty, leg));
            }
            qty = new_qty;
            continue;
        }

        if new_qty.abs() <= QTY_EPSILON {
            // Closed back to flat
            if let Some(mut trip) = open.take() {
                trip.exit_date = Some(trade.trade_date());
                trip.exit_price = Some(trade.price);
                out.push(trip);
            }
            qty = 0.0;
            continue;
        }

        if qty * new_qty < 0.0 {
            // Sign flip: close the old trip and reopen with the leftover
            if let Some(mut trip) = open.take() {
                trip.exit_date = Some(trade.trade_date());
                trip.exit_price = Some(trade.price);
                out.push(trip);
            }
            open = Some(open_trip(trade, new_qty, leg));
        }
        // Partial add or partial exit: trip stays as-is

        qty = new_qty;
    }

    if let Some(trip) = open {
        out.push(trip);
    }
}

fn open_trip(trade: &Trade, signed_qty: f64, leg: Option<LegKey>) -> RoundTrip {
    RoundTrip {
        trade_id: trade.id.clone(),
        symbol: trade.symbol.clone(),
        underlying: trade.underlying.clone(),
        instrument: trade.instrument,
        direction: if signed_qty > 0.0 {
            TradeDirection::Long
        } else {
            TradeDirection::Short
        },
        entry_date: trade.trade_date(),
        entry_price: trade.price,
        exit_date: None,
        exit_price: None,
        leg,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::{OptionContract, OptionType, TradeAction};
    use chrono::{TimeZone, Utc};

    fn stock_trade(id: &str, day: u32, action: TradeAction, qty: f64, price: f64) -> Trade {
        Trade {
            id: id.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 15, 0, 0).unwrap(),
            symbol: "AAPL".to_string(),
            underlying: "AAPL".to_string(),
            action,
            quantity: qty.abs() * action.sign(),
            price,
            commission: 1.0,
            realized_pnl: 0.0,
            instrument: InstrumentType::Stock,
            contract: None,
        }
    }

    fn option_trade(id: &str, day: u32, action: TradeAction, qty: f64, strike: f64) -> Trade {
        Trade {
            id: id.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 15, 0, 0).unwrap(),
            symbol: "AAPL 241220C".to_string(),
            underlying: "AAPL".to_string(),
            action,
            quantity: qty.abs() * action.sign(),
            price: 2.5,
            commission: 0.65,
            realized_pnl: 0.0,
            instrument: InstrumentType::Option,
            contract: Some(OptionContract {
                strike,
                expiry: NaiveDate::from_ymd_opt(2024, 12, 20).unwrap(),
                option_type: OptionType::Call,
            }),
        }
    }

    #[test]
    fn test_simple_closed_trip() {
        let trades = vec![
            stock_trade("t1", 2, TradeAction::Buy, 100.0, 100.0),
            stock_trade("t2", 10, TradeAction::Sell, 100.0, 108.0),
        ];

        let trips = build_round_trips(&trades);
        assert_eq!(trips.len(), 1);

        let trip = &trips[0];
        assert_eq!(trip.trade_id, "t1");
        assert_eq!(trip.direction, TradeDirection::Long);
        assert_eq!(trip.entry_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(trip.exit_date, Some(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()));
        assert!((trip.realized_pnl_pct().unwrap() - 8.0).abs() < 0.001);
    }

    #[test]
    fn test_open_trip_has_no_exit() {
        let trades = vec![stock_trade("t1", 2, TradeAction::Buy, 100.0, 50.0)];
        let trips = build_round_trips(&trades);

        assert_eq!(trips.len(), 1);
        assert!(!trips[0].is_closed());
        assert!(trips[0].realized_pnl_pct().is_none());
    }

    #[test]
    fn test_partial_exit_keeps_trip_open() {
        let trades = vec![
            stock_trade("t1", 2, TradeAction::Buy, 100.0, 100.0),
            stock_trade("t2", 5, TradeAction::Sell, 40.0, 110.0),
        ];

        let trips = build_round_trips(&trades);
        assert_eq!(trips.len(), 1);
        assert!(!trips[0].is_closed());
    }

    #[test]
    fn test_sign_flip_closes_and_reopens() {
        let trades = vec![
            stock_trade("t1", 2, TradeAction::Buy, 100.0, 100.0),
            stock_trade("t2", 5, TradeAction::Sell, 150.0, 110.0),
        ];

        let trips = build_round_trips(&trades);
        assert_eq!(trips.len(), 2);

        let closed = &trips[0];
        assert!(closed.is_closed());
        assert_eq!(closed.trade_id, "t1");
        assert_eq!(closed.exit_price, Some(110.0));

        let reopened = &trips[1];
        assert!(!reopened.is_closed());
        assert_eq!(reopened.trade_id, "t2");
        assert_eq!(reopened.direction, TradeDirection::Short);
        assert!((reopened.entry_price - 110.0).abs() < 0.001);
    }

    #[test]
    fn test_short_trip_realized_pct() {
        let trades = vec![
            stock_trade("t1", 2, TradeAction::Sell, 100.0, 100.0),
            stock_trade("t2", 9, TradeAction::Buy, 100.0, 92.0),
        ];

        let trips = build_round_trips(&trades);
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].direction, TradeDirection::Short);
        // Sold at 100, covered at 92: +8%
        assert!((trips[0].realized_pnl_pct().unwrap() - 8.0).abs() < 0.001);
    }

    #[test]
    fn test_option_trips_pair_per_leg() {
        let trades = vec![
            option_trade("o1", 2, TradeAction::Sell, 1.0, 185.0),
            option_trade("o2", 3, TradeAction::Sell, 1.0, 190.0), // different leg
            option_trade("o3", 9, TradeAction::Buy, 1.0, 185.0),  // closes leg 185
        ];

        let trips = build_round_trips(&trades);
        assert_eq!(trips.len(), 2);

        let closed: Vec<_> = trips.iter().filter(|t| t.is_closed()).collect();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].trade_id, "o1");
        assert_eq!(closed[0].instrument, InstrumentType::Option);
        assert!(closed[0].leg.is_some());
    }

    #[test]
    fn test_consecutive_trips_same_symbol() {
        let trades = vec![
            stock_trade("t1", 2, TradeAction::Buy, 100.0, 100.0),
            stock_trade("t2", 5, TradeAction::Sell, 100.0, 105.0),
            stock_trade("t3", 10, TradeAction::Buy, 50.0, 110.0),
            stock_trade("t4", 15, TradeAction::Sell, 50.0, 120.0),
        ];

        let trips = build_round_trips(&trades);
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].trade_id, "t1");
        assert_eq!(trips[1].trade_id, "t3");
        assert!(trips.iter().all(|t| t.is_closed()));
    }
}
