//! Record validation shared by every parser.
//!
//! Rules run in order and the first failure wins:
//! 1. `date` is a real calendar date written as `YYYY-MM-DD`;
//! 2. `amount` is strictly positive and at most [`MAX_AMOUNT_CENTS`];
//! 3. `description`, trimmed, has at least [`MIN_DESCRIPTION_CHARS`] characters.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;
use crate::transaction::{ParsedRecord, ValidRecord};

pub const MIN_DESCRIPTION_CHARS: usize = 3;

/// One billion in minor units.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum InvalidReason {
    #[error("invalid date: '{0}'")]
    Date(String),
    #[error("amount must be greater than zero")]
    NonPositiveAmount,
    #[error("amount out of range: {0}")]
    AmountOutOfRange(Money),
    #[error("description shorter than 3 characters")]
    DescriptionTooShort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid(ValidRecord),
    Invalid {
        record: ParsedRecord,
        reason: InvalidReason,
    },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }
}

/// Parses a strict `YYYY-MM-DD` date.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return None;
    }
    if !b
        .iter()
        .enumerate()
        .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
    {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub fn validate(record: ParsedRecord) -> ValidationOutcome {
    let date = match parse_iso_date(&record.date) {
        Some(d) => d,
        None => {
            let reason = InvalidReason::Date(record.date.clone());
            return ValidationOutcome::Invalid { record, reason };
        }
    };

    if !record.amount.is_positive() {
        return ValidationOutcome::Invalid {
            record,
            reason: InvalidReason::NonPositiveAmount,
        };
    }
    if record.amount.as_decimal() > Decimal::new(MAX_AMOUNT_CENTS, 2) {
        let reason = InvalidReason::AmountOutOfRange(record.amount);
        return ValidationOutcome::Invalid { record, reason };
    }

    if record.description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
        return ValidationOutcome::Invalid {
            record,
            reason: InvalidReason::DescriptionTooShort,
        };
    }

    ValidationOutcome::Valid(ValidRecord { date, record })
}

/// Splits a batch; every input lands in exactly one of the two outputs.
pub fn partition(records: Vec<ParsedRecord>) -> (Vec<ValidRecord>, Vec<(ParsedRecord, InvalidReason)>) {
    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for record in records {
        match validate(record) {
            ValidationOutcome::Valid(v) => valid.push(v),
            ValidationOutcome::Invalid { record, reason } => invalid.push((record, reason)),
        }
    }
    (valid, invalid)
}
