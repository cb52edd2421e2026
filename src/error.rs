//! Error taxonomy for the journal engine.
//!
//! Per-record and per-symbol failures are isolated: a malformed trade or a
//! missing price history for one symbol never aborts a batch. Only invalid
//! configuration is fatal.

use thiserror::Error;

/// Errors raised while normalizing a raw trade record.
///
/// A `ValidationError` rejects the offending record; callers skip it and
/// continue with the rest of the batch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// A required field is absent from the raw record
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    /// A numeric field could not be coerced and has no permitted default
    #[error("invalid numeric value for '{field}': {raw}")]
    InvalidNumber { field: &'static str, raw: String },

    /// A numeric field is negative where negatives are not permitted
    #[error("negative value not allowed for '{field}': {value}")]
    NegativeNotAllowed { field: &'static str, value: f64 },

    /// A date string matched none of the accepted formats
    #[error("unparseable date '{raw}'")]
    DateParse { raw: String },

    /// The action field is neither BUY nor SELL
    #[error("unknown trade action '{raw}'")]
    UnknownAction { raw: String },

    /// Option fields are present but incomplete (e.g. strike without expiry)
    #[error("incomplete option fields for '{symbol}': {detail}")]
    IncompleteOption { symbol: String, detail: &'static str },
}

impl ValidationError {
    /// Check whether this is the date-parse subtype.
    pub fn is_date_parse(&self) -> bool {
        matches!(self, Self::DateParse { .. })
    }
}

/// Fatal engine errors.
///
/// Everything else in the engine degrades gracefully; these indicate
/// programmer error and are surfaced immediately.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Storage layer failure that cannot be attributed to a single record
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

// ============================================================================
// Tests
// ============================================================================
