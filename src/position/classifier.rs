//! Options-strategy classification.
//!
//! The classifier is an explicit, priority-ordered rule table: each entry is
//! a (predicate, label, risk) tuple, evaluated top to bottom, first match
//! wins. More specific combinations sit above more general fallbacks, and
//! the generic "Options Combo" catch-all is always last; new rules must be
//! inserted above it or they will be shadowed.

use tracing::error;

use super::RiskLevel;
use crate::config::EngineConfig;
use crate::trade::OptionLeg;

/// Quantities inside this band are treated as flat.
const QTY_EPSILON: f64 = 1e-9;

// ============================================================================
// Classifier Input & Output
// ============================================================================

/// The shape a classification decision is made from.
#[derive(Debug, Clone)]
pub struct StrategyShape<'a> {
    /// Net stock quantity (signed)
    pub stock_qty: f64,
    /// Current underlying price (used by moneyness checks)
    pub current_price: f64,
    /// Open option legs
    pub legs: &'a [OptionLeg],
}

impl StrategyShape<'_> {
    fn has_stock(&self) -> bool {
        self.stock_qty.abs() > QTY_EPSILON
    }

    fn is_long_stock(&self) -> bool {
        self.stock_qty > QTY_EPSILON
    }

    fn calls(&self) -> impl Iterator<Item = &OptionLeg> {
        self.legs.iter().filter(|l| l.is_call())
    }

    fn puts(&self) -> impl Iterator<Item = &OptionLeg> {
        self.legs.iter().filter(|l| l.is_put())
    }

    /// The single call leg, if there is exactly one.
    fn single_call(&self) -> Option<&OptionLeg> {
        let mut calls = self.calls();
        match (calls.next(), calls.next()) {
            (Some(leg), None) => Some(leg),
            _ => None,
        }
    }

    /// The single put leg, if there is exactly one.
    fn single_put(&self) -> Option<&OptionLeg> {
        let mut puts = self.puts();
        match (puts.next(), puts.next()) {
            (Some(leg), None) => Some(leg),
            _ => None,
        }
    }

    /// One call and one put, and nothing else.
    fn call_put_pair(&self) -> Option<(&OptionLeg, &OptionLeg)> {
        if self.legs.len() != 2 {
            return None;
        }
        Some((self.single_call()?, self.single_put()?))
    }

    /// Two legs of the same type, and nothing else.
    fn same_type_pair(&self) -> Option<(&OptionLeg, &OptionLeg)> {
        if self.legs.len() != 2 {
            return None;
        }
        let (a, b) = (&self.legs[0], &self.legs[1]);
        (a.option_type == b.option_type).then_some((a, b))
    }
}

/// Result of a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Strategy label (e.g. "Covered Call")
    pub strategy: String,
    /// Risk tier for that strategy
    pub risk_level: RiskLevel,
}

// ============================================================================
// Rule Table
// ============================================================================

/// One entry of the ordered rule table.
struct StrategyRule {
    label: &'static str,
    risk: RiskLevel,
    matches: Box<dyn Fn(&StrategyShape) -> bool + Send + Sync>,
}

/// Priority-ordered strategy classifier.
pub struct StrategyClassifier {
    rules: Vec<StrategyRule>,
}

impl StrategyClassifier {
    /// Build the rule table for the given configuration.
    ///
    /// The table is constructed once and evaluated in order on every call;
    /// configuration only decides which entries are present (e.g. whether a
    /// bare short put is labelled cash-secured or naked).
    pub fn new(config: &EngineConfig) -> Self {
        let large = config.large_position_threshold;
        let (short_put_label, short_put_risk) = if config.treat_short_puts_as_cash_secured {
            ("Cash-Secured Put", RiskLevel::Medium)
        } else {
            ("Naked Put", RiskLevel::High)
        };

        let rules: Vec<StrategyRule> = vec![
            // 1. Stock with no options
            rule("Pure Stock Position", RiskLevel::Low, move |s| {
                s.legs.is_empty() && s.has_stock() && s.stock_qty.abs() < large
            }),
            rule("Pure Stock Position", RiskLevel::Medium, |s| {
                s.legs.is_empty() && s.has_stock()
            }),
            // 2. Long stock + one short call at or above the money
            rule("Covered Call", RiskLevel::Medium, |s| {
                s.is_long_stock()
                    && s.legs.len() == 1
                    && s.single_call()
                        .is_some_and(|c| c.is_short() && c.strike >= s.current_price)
            }),
            // 3. Long stock + short call + long put at different strikes
            rule("Collar", RiskLevel::Low, |s| {
                s.is_long_stock()
                    && s.call_put_pair().is_some_and(|(call, put)| {
                        call.is_short()
                            && put.is_long()
                            && (call.strike - put.strike).abs() > f64::EPSILON
                    })
            }),
            // 4. Long stock + one long put
            rule("Protective Put", RiskLevel::Low, |s| {
                s.is_long_stock()
                    && s.legs.len() == 1
                    && s.single_put().is_some_and(|p| p.is_long())
            }),
            // 5. Bare short put (cash backing is a policy choice, see config)
            rule(short_put_label, short_put_risk, |s| {
                !s.has_stock()
                    && s.legs.len() == 1
                    && s.single_put().is_some_and(|p| p.is_short())
            }),
            // 6. Long volatility pairs
            rule("Long Straddle", RiskLevel::High, |s| {
                !s.has_stock()
                    && s.call_put_pair().is_some_and(|(call, put)| {
                        call.is_long() && put.is_long() && same_strike_and_expiry(call, put)
                    })
            }),
            rule("Long Strangle", RiskLevel::High, |s| {
                !s.has_stock()
                    && s.call_put_pair().is_some_and(|(call, put)| {
                        call.is_long() && put.is_long() && call.expiry == put.expiry
                    })
            }),
            // 7. Short volatility pairs (undefined max loss)
            rule("Short Straddle", RiskLevel::VeryHigh, |s| {
                !s.has_stock()
                    && s.call_put_pair().is_some_and(|(call, put)| {
                        call.is_short() && put.is_short() && same_strike_and_expiry(call, put)
                    })
            }),
            rule("Short Strangle", RiskLevel::VeryHigh, |s| {
                !s.has_stock()
                    && s.call_put_pair()
                        .is_some_and(|(call, put)| call.is_short() && put.is_short())
            }),
            // 8. Two-leg verticals (defined, capped risk)
            rule("Bull Call Spread", RiskLevel::Medium, |s| {
                vertical(s, |long, short| long.is_call() && long.strike < short.strike)
            }),
            rule("Bear Call Spread", RiskLevel::Medium, |s| {
                vertical(s, |long, short| long.is_call() && long.strike > short.strike)
            }),
            rule("Bear Put Spread", RiskLevel::Medium, |s| {
                vertical(s, |long, short| long.is_put() && long.strike > short.strike)
            }),
            rule("Bull Put Spread", RiskLevel::Medium, |s| {
                vertical(s, |long, short| long.is_put() && long.strike < short.strike)
            }),
            // 9. Four-leg wings around the money (defined max loss)
            rule("Iron Butterfly", RiskLevel::Medium, |s| {
                iron_wings(s).is_some_and(|(short_call, short_put)| {
                    (short_call - short_put).abs() <= f64::EPSILON
                })
            }),
            rule("Iron Condor", RiskLevel::Medium, |s| {
                iron_wings(s).is_some_and(|(short_call, short_put)| short_call > short_put)
            }),
            // 10. Catch-all: anything with at least one leg. New rules go
            //     strictly above this entry.
            rule("Options Combo", RiskLevel::High, |s| !s.legs.is_empty()),
        ];

        Self { rules }
    }

    /// Classify a shape. Returns `None` only for the empty shape (no stock,
    /// no legs), which the aggregator never emits.
    pub fn classify(&self, shape: &StrategyShape) -> Option<Classification> {
        if !shape.has_stock() && shape.legs.is_empty() {
            return None;
        }

        for entry in &self.rules {
            if (entry.matches)(shape) {
                return Some(Classification {
                    strategy: entry.label.to_string(),
                    risk_level: entry.risk,
                });
            }
        }

        // Unreachable given the catch-all, but a rule-table bug must not
        // panic a batch: log loudly and degrade to the generic label.
        error!(
            stock_qty = shape.stock_qty,
            legs = shape.legs.len(),
            "No classification rule matched; falling back to Options Combo"
        );
        Some(Classification {
            strategy: "Options Combo".to_string(),
            risk_level: RiskLevel::High,
        })
    }
}

/// Classify with a throwaway table. Convenience for one-off calls; the
/// engine holds a long-lived [`StrategyClassifier`] instead.
pub fn classify(shape: &StrategyShape, config: &EngineConfig) -> Option<Classification> {
    StrategyClassifier::new(config).classify(shape)
}

fn rule(
    label: &'static str,
    risk: RiskLevel,
    matches: impl Fn(&StrategyShape) -> bool + Send + Sync + 'static,
) -> StrategyRule {
    StrategyRule {
        label,
        risk,
        matches: Box::new(matches),
    }
}

fn same_strike_and_expiry(a: &OptionLeg, b: &OptionLeg) -> bool {
    (a.strike - b.strike).abs() <= f64::EPSILON && a.expiry == b.expiry
}

/// Match a two-leg vertical: same type, same expiry, one long one short,
/// different strikes, no stock. The predicate sees (long, short).
fn vertical(shape: &StrategyShape, check: impl Fn(&OptionLeg, &OptionLeg) -> bool) -> bool {
    if shape.has_stock() {
        return false;
    }
    let Some((a, b)) = shape.same_type_pair() else {
        return false;
    };
    if a.expiry != b.expiry || (a.strike - b.strike).abs() <= f64::EPSILON {
        return false;
    }
    let (long, short) = match (a.is_long(), b.is_long()) {
        (true, false) => (a, b),
        (false, true) => (b, a),
        _ => return false,
    };
    check(long, short)
}

/// Match the iron-condor/butterfly frame: no stock, four legs in one
/// expiry: short call with a long call wing above it, short put with a
/// long put wing below it. Returns the (short call, short put) strikes.
fn iron_wings(shape: &StrategyShape) -> Option<(f64, f64)> {
    if shape.has_stock() || shape.legs.len() != 4 {
        return None;
    }

    let expiry = shape.legs[0].expiry;
    if !shape.legs.iter().all(|l| l.expiry == expiry) {
        return None;
    }

    let mut short_call = None;
    let mut long_call = None;
    let mut short_put = None;
    let mut long_put = None;
    for leg in shape.legs {
        let slot = match (leg.is_call(), leg.is_long()) {
            (true, false) => &mut short_call,
            (true, true) => &mut long_call,
            (false, false) => &mut short_put,
            (false, true) => &mut long_put,
        };
        if slot.is_some() {
            return None; // duplicate role, not a clean four-leg frame
        }
        *slot = Some(leg.strike);
    }

    let (sc, lc, sp, lp) = (short_call?, long_call?, short_put?, long_put?);
    (lc > sc && lp < sp && sc >= sp).then_some((sc, sp))
}

// ============================================================================
// Tests
// ============================================================================
