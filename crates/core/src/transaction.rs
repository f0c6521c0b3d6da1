use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::AccountId;
use crate::category::{CategoryId, Confidence};
use crate::money::Money;
use crate::reconciliation::ReconciliationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inflow,
    Outflow,
}

impl Direction {
    /// Non-negative amounts are inflows.
    pub fn from_signed(amount: Money) -> Self {
        if amount.is_negative() {
            Direction::Outflow
        } else {
            Direction::Inflow
        }
    }

    /// Strict label lookup used for structured sources. Accepts the
    /// English and Portuguese names for both directions.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "inflow" | "credit" | "receita" | "credito" | "crédito" | "entrada" => {
                Some(Direction::Inflow)
            }
            "outflow" | "debit" | "despesa" | "debito" | "débito" | "saida" | "saída" => {
                Some(Direction::Outflow)
            }
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Inflow => Direction::Outflow,
            Direction::Outflow => Direction::Inflow,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inflow => "inflow",
            Direction::Outflow => "outflow",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inflow" => Ok(Direction::Inflow),
            "outflow" => Ok(Direction::Outflow),
            other => Err(format!("Unknown direction: '{other}'")),
        }
    }
}

/// Intermediate record produced by every parser.
///
/// `date` is the parser's normalised `YYYY-MM-DD` text; whether it names a
/// real calendar day is decided by [`crate::validate`]. `amount` is never
/// negative, the sign lives in `direction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub date: String,
    pub description: String,
    pub amount: Money,
    pub direction: Direction,
    pub external_document_id: Option<String>,
    pub source_balance: Option<Money>,
    /// Category label supplied by the source (aggregators only).
    pub category_label: Option<String>,
    /// The source reports this movement as posted and final.
    pub cleared: bool,
}

impl ParsedRecord {
    pub fn new(date: impl Into<String>, description: impl Into<String>, signed: Money) -> Self {
        ParsedRecord {
            date: date.into(),
            description: description.into(),
            amount: signed.abs(),
            direction: Direction::from_signed(signed),
            external_document_id: None,
            source_balance: None,
            category_label: None,
            cleared: false,
        }
    }

    pub fn signed_amount(&self) -> Money {
        match self.direction {
            Direction::Inflow => self.amount,
            Direction::Outflow => -self.amount,
        }
    }
}

/// A record that passed validation, with its date resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidRecord {
    pub date: NaiveDate,
    pub record: ParsedRecord,
}

impl ValidRecord {
    pub fn description(&self) -> &str {
        &self.record.description
    }

    pub fn amount(&self) -> Money {
        self.record.amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel a stored transaction arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    DelimitedFile,
    OfxFile,
    ExtractedFile,
    AggregatorPull,
    AggregatorWebhook,
}

impl SourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::DelimitedFile => "delimited_file",
            SourceTag::OfxFile => "ofx_file",
            SourceTag::ExtractedFile => "extracted_file",
            SourceTag::AggregatorPull => "aggregator_pull",
            SourceTag::AggregatorWebhook => "aggregator_webhook",
        }
    }

    pub fn is_aggregator(self) -> bool {
        matches!(self, SourceTag::AggregatorPull | SourceTag::AggregatorWebhook)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceTag {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delimited_file" => Ok(SourceTag::DelimitedFile),
            "ofx_file" => Ok(SourceTag::OfxFile),
            "extracted_file" => Ok(SourceTag::ExtractedFile),
            "aggregator_pull" => Ok(SourceTag::AggregatorPull),
            "aggregator_webhook" => Ok(SourceTag::AggregatorWebhook),
            other => Err(format!("Unknown source tag: '{other}'")),
        }
    }
}

/// A persisted transaction. Owned by the datastore; the engine only
/// refers to it by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub direction: Direction,
    pub category_id: Option<CategoryId>,
    pub reconciliation_status: ReconciliationStatus,
    pub settlement_date: Option<NaiveDate>,
    pub settlement_account_id: Option<AccountId>,
    pub source: SourceTag,
    pub origin_external_id: Option<String>,
    pub transfer_link_id: Option<TransactionId>,
}

/// Row the coordinator asks the datastore to insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub direction: Direction,
    pub category_id: Option<CategoryId>,
    pub category_confidence: Confidence,
    pub reconciliation_status: ReconciliationStatus,
    pub settlement_date: Option<NaiveDate>,
    pub settlement_account_id: Option<AccountId>,
    pub source: SourceTag,
    pub origin_external_id: Option<String>,
}
