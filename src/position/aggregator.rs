//! Position aggregation: flat trade history → per-underlying positions.

use std::collections::BTreeMap;
use tracing::debug;

use super::{Position, RiskLevel};
use crate::trade::{OptionLeg, Trade};

/// Quantities inside this band are treated as flat.
const QTY_EPSILON: f64 = 1e-9;

/// Groups trades by underlying and consolidates stock and option legs.
///
/// Pure derivation: the same trade history always yields the same positions.
/// Current prices, unrealized P&L, and strategy labels are filled in by the
/// caller afterwards (quotes and classification are separate passes).
#[derive(Debug, Clone, Default)]
pub struct PositionAggregator;

impl PositionAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate a trade history into one position per underlying.
    ///
    /// Underlyings that end up flat with no open option legs are not
    /// emitted. Trades are walked in chronological order regardless of
    /// input order.
    pub fn aggregate(&self, trades: &[Trade]) -> BTreeMap<String, Position> {
        let mut by_underlying: BTreeMap<String, Vec<&Trade>> = BTreeMap::new();
        for trade in trades {
            by_underlying
                .entry(trade.underlying.clone())
                .or_default()
                .push(trade);
        }

        let mut positions = BTreeMap::new();
        for (underlying, mut group) in by_underlying {
            group.sort_by_key(|t| t.timestamp);

            if let Some(position) = consolidate(&underlying, &group) {
                positions.insert(underlying, position);
            } else {
                debug!(underlying, "No open stock or option exposure, skipping");
            }
        }

        positions
    }
}

/// Consolidate one underlying's chronologically-sorted trades.
fn consolidate(underlying: &str, trades: &[&Trade]) -> Option<Position> {
    let mut stock_qty = 0.0_f64;
    let mut avg_cost = 0.0_f64;
    let mut realized_pnl = 0.0_f64;
    // Leg order must follow first-trade order, so a Vec instead of a map.
    let mut legs: Vec<(crate::trade::LegKey, f64)> = Vec::new();

    for &trade in trades {
        realized_pnl += trade.realized_pnl;

        if let Some(key) = trade.leg_key() {
            match legs.iter_mut().find(|(k, _)| *k == key) {
                Some((_, net)) => *net += trade.quantity,
                None => legs.push((key, trade.quantity)),
            }
            continue;
        }

        (stock_qty, avg_cost) = apply_stock_trade(stock_qty, avg_cost, trade);
    }

    let open_legs: Vec<OptionLeg> = legs
        .into_iter()
        .filter(|(_, net)| net.abs() > QTY_EPSILON)
        .map(|(key, net)| OptionLeg {
            option_type: key.option_type,
            strike: key.strike(),
            expiry: key.expiry,
            net_quantity: net,
        })
        .collect();

    if stock_qty.abs() <= QTY_EPSILON && open_legs.is_empty() {
        return None;
    }

    let stock_qty = if stock_qty.abs() <= QTY_EPSILON {
        0.0
    } else {
        stock_qty
    };
    let avg_cost = if stock_qty == 0.0 { 0.0 } else { avg_cost };

    Some(Position {
        underlying: underlying.to_string(),
        quantity: stock_qty,
        avg_cost,
        // Placeholders until the quote and classification passes run.
        current_price: avg_cost,
        unrealized_pnl: 0.0,
        realized_pnl,
        legs: open_legs,
        strategy: String::new(),
        risk_level: RiskLevel::Low,
    })
}

/// Apply one stock trade to the running (quantity, avg_cost) state.
///
/// Buys into an existing same-direction position re-weight the average
/// cost; reductions leave it untouched (realized P&L comes verbatim from
/// the trade record, never from here). Crossing through flat resets the
/// average to the re-opening trade's price; the gap is a flat state, not
/// interpolated.
fn apply_stock_trade(qty: f64, avg_cost: f64, trade: &Trade) -> (f64, f64) {
    let trade_qty = trade.quantity;
    let new_qty = qty + trade_qty;

    // Opening from flat
    if qty.abs() <= QTY_EPSILON {
        return (trade_qty, trade.price);
    }

    // Adding in the same direction: weighted-average cost
    if qty * trade_qty > 0.0 {
        let new_avg = (qty.abs() * avg_cost + trade_qty.abs() * trade.price)
            / (qty.abs() + trade_qty.abs());
        return (new_qty, new_avg);
    }

    // Reducing to exactly flat
    if new_qty.abs() <= QTY_EPSILON {
        return (0.0, 0.0);
    }

    // Reducing without crossing: quantity shrinks, average unchanged
    if qty * new_qty > 0.0 {
        return (new_qty, avg_cost);
    }

    // Crossed through flat: the leftover opens a new position at this price
    (new_qty, trade.price)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::{InstrumentType, OptionContract, OptionType, TradeAction};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn stock_trade(day: u32, action: TradeAction, qty: f64, price: f64, pnl: f64) -> Trade {
        Trade {
            id: format!("s{day}-{qty}"),
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 15, 0, 0).unwrap(),
            symbol: "AAPL".to_string(),
            underlying: "AAPL".to_string(),
            action,
            quantity: qty.abs() * action.sign(),
            price,
            commission: 1.0,
            realized_pnl: pnl,
            instrument: InstrumentType::Stock,
            contract: None,
        }
    }

    fn option_trade(
        day: u32,
        action: TradeAction,
        qty: f64,
        strike: f64,
        option_type: OptionType,
    ) -> Trade {
        Trade {
            id: format!("o{day}-{strike}-{qty}"),
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 15, 0, 0).unwrap(),
            symbol: format!("AAPL 241220{option_type}{strike}"),
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
                option_type,
            }),
        }
    }

    #[test]
    fn test_weighted_average_cost_on_buys() {
        let aggregator = PositionAggregator::new();
        let trades = vec![
            stock_trade(2, TradeAction::Buy, 100.0, 100.0, 0.0),
            stock_trade(3, TradeAction::Buy, 100.0, 110.0, 0.0),
        ];

        let positions = aggregator.aggregate(&trades);
        let position = &positions["AAPL"];

        assert!((position.quantity - 200.0).abs() < 0.001);
        assert!((position.avg_cost - 105.0).abs() < 0.001);
    }

    #[test]
    fn test_sell_reduces_without_touching_avg_cost() {
        let aggregator = PositionAggregator::new();
        let trades = vec![
            stock_trade(2, TradeAction::Buy, 100.0, 100.0, 0.0),
            stock_trade(3, TradeAction::Sell, 40.0, 120.0, 800.0),
        ];

        let positions = aggregator.aggregate(&trades);
        let position = &positions["AAPL"];

        assert!((position.quantity - 60.0).abs() < 0.001);
        assert!((position.avg_cost - 100.0).abs() < 0.001);
        // Realized P&L taken verbatim from the trade record
        assert!((position.realized_pnl - 800.0).abs() < 0.001);
    }

    #[test]
    fn test_flat_crossing_resets_avg_cost() {
        let aggregator = PositionAggregator::new();
        let trades = vec![
            stock_trade(2, TradeAction::Buy, 100.0, 100.0, 0.0),
            stock_trade(3, TradeAction::Sell, 100.0, 110.0, 1000.0),
            stock_trade(10, TradeAction::Buy, 50.0, 130.0, 0.0),
        ];

        let positions = aggregator.aggregate(&trades);
        let position = &positions["AAPL"];

        // Re-opened after a flat gap: avg cost is the re-opening price
        assert!((position.quantity - 50.0).abs() < 0.001);
        assert!((position.avg_cost - 130.0).abs() < 0.001);
        assert!((position.realized_pnl - 1000.0).abs() < 0.001);
    }

    #[test]
    fn test_sign_flip_reopens_at_crossing_price() {
        let aggregator = PositionAggregator::new();
        // Long 100, then sell 150 in one fill: leftover is short 50 @ 115
        let trades = vec![
            stock_trade(2, TradeAction::Buy, 100.0, 100.0, 0.0),
            stock_trade(5, TradeAction::Sell, 150.0, 115.0, 1500.0),
        ];

        let positions = aggregator.aggregate(&trades);
        let position = &positions["AAPL"];

        assert!((position.quantity + 50.0).abs() < 0.001);
        assert!((position.avg_cost - 115.0).abs() < 0.001);
    }

    #[test]
    fn test_fully_closed_underlying_not_emitted() {
        let aggregator = PositionAggregator::new();
        let trades = vec![
            stock_trade(2, TradeAction::Buy, 100.0, 100.0, 0.0),
            stock_trade(3, TradeAction::Sell, 100.0, 110.0, 1000.0),
        ];

        let positions = aggregator.aggregate(&trades);
        assert!(positions.is_empty());
    }

    #[test]
    fn test_option_legs_netted_and_closed_legs_dropped() {
        let aggregator = PositionAggregator::new();
        let trades = vec![
            option_trade(2, TradeAction::Sell, 1.0, 185.0, OptionType::Call),
            option_trade(3, TradeAction::Buy, 2.0, 170.0, OptionType::Put),
            // Close the put leg completely
            option_trade(8, TradeAction::Sell, 2.0, 170.0, OptionType::Put),
        ];

        let positions = aggregator.aggregate(&trades);
        let position = &positions["AAPL"];

        assert_eq!(position.legs.len(), 1);
        let leg = &position.legs[0];
        assert!(leg.is_short());
        assert!(leg.is_call());
        assert!((leg.net_quantity + 1.0).abs() < 0.001);
        assert!((position.quantity).abs() < 0.001);
    }

    #[test]
    fn test_leg_order_follows_first_trade() {
        let aggregator = PositionAggregator::new();
        let trades = vec![
            option_trade(2, TradeAction::Buy, 1.0, 170.0, OptionType::Put),
            option_trade(3, TradeAction::Sell, 1.0, 185.0, OptionType::Call),
        ];

        let positions = aggregator.aggregate(&trades);
        let legs = &positions["AAPL"].legs;

        assert_eq!(legs.len(), 2);
        assert!(legs[0].is_put());
        assert!(legs[1].is_call());
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let aggregator = PositionAggregator::new();
        let mut trades = vec![
            stock_trade(3, TradeAction::Buy, 50.0, 110.0, 0.0),
            stock_trade(2, TradeAction::Buy, 100.0, 100.0, 0.0),
        ];

        let a = aggregator.aggregate(&trades);
        trades.reverse();
        let b = aggregator.aggregate(&trades);

        // Input order must not matter: chronological walk either way
        assert!((a["AAPL"].avg_cost - b["AAPL"].avg_cost).abs() < 1e-12);
        assert!((a["AAPL"].avg_cost - 103.333333).abs() < 0.001);
    }
}
