//! Trade normalizer: raw broker records into canonical [`Trade`]s.
//!
//! Broker feeds are loosely typed (numbers arrive as strings, dates in
//! several shapes, fields go missing). Normalization is defensive and
//! declarative: each numeric field has a [`FieldRule`] giving its default
//! and whether negatives are permitted, and dates are tried against a fixed
//! priority list of formats. A record that cannot be coerced is rejected
//! with a [`ValidationError`]; the batch continues without it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::{InstrumentType, OptionContract, OptionType, Trade, TradeAction};
use crate::error::ValidationError;

/// Accepted date shapes, tried in priority order. First match wins.
/// The flag marks shapes that carry a time-of-day component.
const DATE_FORMATS: &[(&str, bool)] = &[
    ("%Y%m%d", false),
    ("%Y-%m-%d", false),
    ("%Y%m%d;%H%M%S", true),
    ("%Y/%m/%d", false),
];

// ============================================================================
// Raw Record
// ============================================================================

/// One raw trade record as it arrives from ingestion.
///
/// Numeric fields are `Value` so both `"100"` and `100` survive
/// deserialization; everything is optional and validated in [`TradeNormalizer`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTrade {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub underlying: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub commission: Option<Value>,
    #[serde(default)]
    pub realized_pnl: Option<Value>,
    #[serde(default)]
    pub strike: Option<Value>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub option_type: Option<String>,
}

// ============================================================================
// Field Rules
// ============================================================================

/// Coercion rule for one numeric field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FieldRule {
    /// Substituted when the field is missing or unparseable.
    /// `None` makes the field required.
    pub default: Option<f64>,
    /// Whether negative values are permitted
    pub allow_negative: bool,
}

impl FieldRule {
    /// Required field, negatives allowed.
    pub fn required_signed() -> Self {
        Self {
            default: None,
            allow_negative: true,
        }
    }

    /// Required field, must be non-negative.
    pub fn required_unsigned() -> Self {
        Self {
            default: None,
            allow_negative: false,
        }
    }

    /// Optional field defaulting to the given value.
    pub fn optional(default: f64, allow_negative: bool) -> Self {
        Self {
            default: Some(default),
            allow_negative,
        }
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// Validates and coerces raw trade records.
///
/// Pure: no side effects beyond a `warn!` per skipped batch record.
#[derive(Debug, Clone)]
pub struct TradeNormalizer {
    quantity_rule: FieldRule,
    price_rule: FieldRule,
    commission_rule: FieldRule,
    realized_pnl_rule: FieldRule,
    strike_rule: FieldRule,
}

impl Default for TradeNormalizer {
    fn default() -> Self {
        Self {
            quantity_rule: FieldRule::required_signed(),
            price_rule: FieldRule::required_unsigned(),
            commission_rule: FieldRule::optional(0.0, false),
            realized_pnl_rule: FieldRule::optional(0.0, true),
            strike_rule: FieldRule::required_unsigned(),
        }
    }
}

impl TradeNormalizer {
    /// Create a normalizer with the default per-field rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize one raw record into a canonical [`Trade`].
    pub fn normalize(&self, raw: &RawTrade) -> Result<Trade, ValidationError> {
        let symbol = raw
            .symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingField { field: "symbol" })?
            .to_string();

        let timestamp_raw = raw
            .timestamp
            .as_deref()
            .ok_or(ValidationError::MissingField { field: "timestamp" })?;
        let timestamp = parse_timestamp(timestamp_raw)?;

        let action_raw = raw
            .action
            .as_deref()
            .ok_or(ValidationError::MissingField { field: "action" })?;
        let action = TradeAction::from_str(action_raw).ok_or_else(|| {
            ValidationError::UnknownAction {
                raw: action_raw.to_string(),
            }
        })?;

        let quantity = safe_float("quantity", raw.quantity.as_ref(), self.quantity_rule)?;
        let price = safe_float("price", raw.price.as_ref(), self.price_rule)?;
        let commission = safe_float("commission", raw.commission.as_ref(), self.commission_rule)?;
        let realized_pnl = safe_float(
            "realized_pnl",
            raw.realized_pnl.as_ref(),
            self.realized_pnl_rule,
        )?;

        // Sign convention: magnitude from the field, sign from the action.
        let quantity = quantity.abs() * action.sign();

        let contract = self.parse_contract(raw, &symbol)?;
        let instrument = if contract.is_some() {
            InstrumentType::Option
        } else {
            InstrumentType::Stock
        };

        let underlying = raw
            .underlying
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match instrument {
                InstrumentType::Stock => symbol.clone(),
                InstrumentType::Option => symbol_root(&symbol),
            });

        let id = raw
            .id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| stable_trade_id(&symbol, timestamp, action, quantity, price));

        Ok(Trade {
            id,
            timestamp,
            symbol,
            underlying,
            action,
            quantity,
            price,
            commission,
            realized_pnl,
            instrument,
            contract,
        })
    }

    /// Normalize a batch, rejecting bad records individually.
    ///
    /// Never fails wholesale: the outcome carries the valid trades plus one
    /// [`SkippedRecord`] per rejection so callers can report partial results.
    pub fn normalize_batch(&self, raws: &[RawTrade]) -> NormalizeOutcome {
        let mut trades = Vec::with_capacity(raws.len());
        let mut skipped = Vec::new();

        for (index, raw) in raws.iter().enumerate() {
            match self.normalize(raw) {
                Ok(trade) => trades.push(trade),
                Err(error) => {
                    warn!(
                        index,
                        symbol = raw.symbol.as_deref().unwrap_or("<missing>"),
                        %error,
                        "Skipping malformed trade record"
                    );
                    skipped.push(SkippedRecord { index, error });
                }
            }
        }

        NormalizeOutcome { trades, skipped }
    }

    /// Parse option contract fields if any are present.
    ///
    /// Partially-specified contracts (e.g. a strike without an expiry) are
    /// malformed rather than silently treated as stock trades.
    fn parse_contract(
        &self,
        raw: &RawTrade,
        symbol: &str,
    ) -> Result<Option<OptionContract>, ValidationError> {
        let has_any = raw.strike.is_some() || raw.expiry.is_some() || raw.option_type.is_some();
        if !has_any {
            return Ok(None);
        }

        let strike = match raw.strike.as_ref() {
            Some(_) => safe_float("strike", raw.strike.as_ref(), self.strike_rule)?,
            None => {
                return Err(ValidationError::IncompleteOption {
                    symbol: symbol.to_string(),
                    detail: "missing strike",
                })
            }
        };

        let expiry_raw = raw.expiry.as_deref().ok_or_else(|| {
            ValidationError::IncompleteOption {
                symbol: symbol.to_string(),
                detail: "missing expiry",
            }
        })?;
        let expiry = parse_date(expiry_raw)?;

        let type_raw = raw.option_type.as_deref().ok_or_else(|| {
            ValidationError::IncompleteOption {
                symbol: symbol.to_string(),
                detail: "missing option type",
            }
        })?;
        let option_type = OptionType::from_str(type_raw).ok_or_else(|| {
            ValidationError::IncompleteOption {
                symbol: symbol.to_string(),
                detail: "unknown option type",
            }
        })?;

        Ok(Some(OptionContract {
            strike,
            expiry,
            option_type,
        }))
    }
}

/// Outcome of a batch normalization pass.
#[derive(Debug, Clone)]
pub struct NormalizeOutcome {
    /// Successfully normalized trades, in input order
    pub trades: Vec<Trade>,
    /// Rejected records with their reasons
    pub skipped: Vec<SkippedRecord>,
}

/// One rejected batch record.
#[derive(Debug, Clone)]
pub struct SkippedRecord {
    /// Index of the record in the input batch
    pub index: usize,
    /// Why it was rejected
    pub error: ValidationError,
}

// ============================================================================
// Parsing Helpers
// ============================================================================

/// Coerce a loosely-typed JSON value into an f64 under a [`FieldRule`].
pub fn safe_float(
    field: &'static str,
    value: Option<&Value>,
    rule: FieldRule,
) -> Result<f64, ValidationError> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let cleaned = s.trim().replace(',', "");
            if cleaned.is_empty() {
                None
            } else {
                cleaned.parse::<f64>().ok()
            }
        }
        _ => None,
    };

    let number = match parsed {
        Some(n) if n.is_finite() => n,
        _ => match rule.default {
            Some(default) => default,
            None => {
                return Err(match value {
                    Some(v) => ValidationError::InvalidNumber {
                        field,
                        raw: v.to_string(),
                    },
                    None => ValidationError::MissingField { field },
                })
            }
        },
    };

    if number < 0.0 && !rule.allow_negative {
        return Err(ValidationError::NegativeNotAllowed {
            field,
            value: number,
        });
    }

    Ok(number)
}

/// Coerce a loosely-typed JSON value into an i64 under a [`FieldRule`].
pub fn safe_int(
    field: &'static str,
    value: Option<&Value>,
    rule: FieldRule,
) -> Result<i64, ValidationError> {
    Ok(safe_float(field, value, rule)?.round() as i64)
}

/// Parse a date string against the accepted shapes, in priority order.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    parse_naive(raw).map(|dt| dt.date())
}

/// Parse a timestamp string; date-only shapes map to midnight UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    parse_naive(raw).map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}

fn parse_naive(raw: &str) -> Result<NaiveDateTime, ValidationError> {
    let trimmed = raw.trim();

    for (format, has_time) in DATE_FORMATS {
        if *has_time {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(dt);
            }
        } else if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date.and_time(NaiveTime::MIN));
        }
    }

    Err(ValidationError::DateParse {
        raw: raw.to_string(),
    })
}

/// Root symbol of an option encoding: the leading alphabetic prefix
/// (e.g. "AAPL" from "AAPL 241220C00185000" or "AAPL241220C185").
fn symbol_root(symbol: &str) -> String {
    let root: String = symbol
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if root.is_empty() {
        symbol.to_string()
    } else {
        root
    }
}

/// Stable content-hash id for trades whose feed omitted one.
fn stable_trade_id(
    symbol: &str,
    timestamp: DateTime<Utc>,
    action: TradeAction,
    quantity: f64,
    price: f64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(symbol.as_bytes());
    hasher.update(timestamp.timestamp_millis().to_le_bytes());
    hasher.update(action.to_string().as_bytes());
    hasher.update(quantity.to_le_bytes());
    hasher.update(price.to_le_bytes());
    hex::encode(&hasher.finalize()[..12])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_stock(symbol: &str, date: &str, action: &str, qty: f64, price: f64) -> RawTrade {
        RawTrade {
            symbol: Some(symbol.to_string()),
            timestamp: Some(date.to_string()),
            action: Some(action.to_string()),
            quantity: Some(json!(qty)),
            price: Some(json!(price)),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(parse_date("20240102").unwrap(), expected);
        assert_eq!(parse_date("2024-01-02").unwrap(), expected);
        assert_eq!(parse_date("2024/01/02").unwrap(), expected);
        assert_eq!(parse_date("20240102;143000").unwrap(), expected);
    }

    #[test]
    fn test_parse_timestamp_keeps_time() {
        let ts = parse_timestamp("20240102;143000").unwrap();
        assert_eq!(ts.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(ts.format("%H%M%S").to_string(), "143000");

        let midnight = parse_timestamp("2024-01-02").unwrap();
        assert_eq!(midnight.format("%H%M%S").to_string(), "000000");
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        let err = parse_date("2024-13-40").unwrap_err();
        assert!(err.is_date_parse());
        assert!(err.to_string().contains("2024-13-40"));
    }

    #[test]
    fn test_safe_float_from_string_and_number() {
        let rule = FieldRule::required_signed();
        assert!((safe_float("q", Some(&json!("1,234.5")), rule).unwrap() - 1234.5).abs() < 0.001);
        assert!((safe_float("q", Some(&json!(42)), rule).unwrap() - 42.0).abs() < 0.001);
    }

    #[test]
    fn test_safe_float_default_substitution() {
        let rule = FieldRule::optional(0.0, false);
        assert!((safe_float("commission", None, rule).unwrap()).abs() < 0.001);
        assert!((safe_float("commission", Some(&json!("n/a")), rule).unwrap()).abs() < 0.001);
    }

    #[test]
    fn test_safe_float_negative_policy() {
        let unsigned = FieldRule::required_unsigned();
        let err = safe_float("commission", Some(&json!(-1.0)), unsigned).unwrap_err();
        assert!(matches!(err, ValidationError::NegativeNotAllowed { .. }));

        let signed = FieldRule::required_signed();
        assert!((safe_float("quantity", Some(&json!(-100)), signed).unwrap() + 100.0).abs() < 0.001);
    }

    #[test]
    fn test_safe_int_rounds() {
        let rule = FieldRule::required_signed();
        assert_eq!(safe_int("n", Some(&json!("3.7")), rule).unwrap(), 4);
    }

    #[test]
    fn test_normalize_stock_trade() {
        let normalizer = TradeNormalizer::new();
        let trade = normalizer
            .normalize(&raw_stock("AAPL", "2024-01-02", "BUY", 100.0, 175.5))
            .unwrap();

        assert_eq!(trade.symbol, "AAPL");
        assert_eq!(trade.underlying, "AAPL");
        assert_eq!(trade.action, TradeAction::Buy);
        assert_eq!(trade.instrument, InstrumentType::Stock);
        assert!((trade.quantity - 100.0).abs() < 0.001);
        assert!(!trade.id.is_empty());
    }

    #[test]
    fn test_normalize_sell_quantity_signed() {
        let normalizer = TradeNormalizer::new();
        // Feed reports positive quantity on a SELL; sign comes from the action.
        let trade = normalizer
            .normalize(&raw_stock("AAPL", "2024-01-10", "SELL", 100.0, 180.0))
            .unwrap();
        assert!((trade.quantity + 100.0).abs() < 0.001);
    }

    #[test]
    fn test_normalize_option_trade() {
        let normalizer = TradeNormalizer::new();
        let mut raw = raw_stock("AAPL 241220C00185000", "20240603", "SELL", 1.0, 2.35);
        raw.strike = Some(json!(185.0));
        raw.expiry = Some("20241220".to_string());
        raw.option_type = Some("CALL".to_string());

        let trade = normalizer.normalize(&raw).unwrap();
        assert_eq!(trade.instrument, InstrumentType::Option);
        assert_eq!(trade.underlying, "AAPL");
        let contract = trade.contract.unwrap();
        assert!((contract.strike - 185.0).abs() < 0.001);
        assert_eq!(contract.option_type, OptionType::Call);
    }

    #[test]
    fn test_normalize_incomplete_option_rejected() {
        let normalizer = TradeNormalizer::new();
        let mut raw = raw_stock("AAPL", "20240603", "BUY", 1.0, 2.35);
        raw.strike = Some(json!(185.0)); // strike without expiry/type

        let err = normalizer.normalize(&raw).unwrap_err();
        assert!(matches!(err, ValidationError::IncompleteOption { .. }));
    }

    #[test]
    fn test_normalize_batch_isolates_bad_records() {
        let normalizer = TradeNormalizer::new();
        let raws = vec![
            raw_stock("AAPL", "2024-01-02", "BUY", 100.0, 175.5),
            raw_stock("MSFT", "2024-13-40", "BUY", 10.0, 400.0), // bad date
            raw_stock("NVDA", "20240105", "SELL", 5.0, 500.0),
        ];

        let outcome = normalizer.normalize_batch(&raws);
        assert_eq!(outcome.trades.len(), 2);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].index, 1);
        assert!(outcome.skipped[0].error.is_date_parse());
    }

    #[test]
    fn test_stable_id_is_deterministic() {
        let normalizer = TradeNormalizer::new();
        let raw = raw_stock("AAPL", "2024-01-02", "BUY", 100.0, 175.5);
        let a = normalizer.normalize(&raw).unwrap();
        let b = normalizer.normalize(&raw).unwrap();
        assert_eq!(a.id, b.id);

        let other = normalizer
            .normalize(&raw_stock("AAPL", "2024-01-03", "BUY", 100.0, 175.5))
            .unwrap();
        assert_ne!(a.id, other.id);
    }

    #[test]
    fn test_symbol_root() {
        assert_eq!(symbol_root("AAPL 241220C00185000"), "AAPL");
        assert_eq!(symbol_root("SPY241220P450"), "SPY");
        assert_eq!(symbol_root("123"), "123");
    }
}
