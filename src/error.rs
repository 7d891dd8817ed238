//! Settlement error kinds
//!
//! Every failure propagates to the caller; nothing here is ever mapped to an
//! empty winner list.

use thiserror::Error;

use crate::models::{BetCategory, PeriodId};

/// Errors that can occur while settling or persisting a period
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Unknown bet category: {0}")]
    InvalidCategory(String),

    #[error("Invalid number {number:?} for {category}: expected {expected_digits} digit(s)")]
    InvalidNumber {
        category: BetCategory,
        number: String,
        expected_digits: usize,
    },

    #[error("Invalid wager: {0}")]
    InvalidWager(String),

    #[error("No payout rate configured for {0}")]
    ConfigMissing(BetCategory),

    #[error("Outcome set belongs to period {found}, not {expected}")]
    PeriodMismatch { expected: PeriodId, found: PeriodId },

    #[error("Amount overflow while computing {0}")]
    AmountOverflow(&'static str),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] rusqlite::Error),

    #[error("Corrupt stored value in {column}: {value:?}")]
    CorruptValue { column: &'static str, value: String },
}

impl SettlementError {
    /// No result has been announced for the period.
    pub fn result_not_found(period_id: PeriodId) -> Self {
        SettlementError::NotFound {
            entity: "Result for period",
            id: period_id,
        }
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;
