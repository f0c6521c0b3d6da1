use thiserror::Error;

use saldo_core::{AccountId, SettlementError};
use saldo_extract::ExtractError;
use saldo_import::ParseError;
use saldo_storage::StoreError;

use crate::aggregator::AggregatorError;

/// Failures that abort a whole ingestion call. Per-record problems never
/// end up here; they are counted in the report instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unknown account {0}")]
    UnknownAccount(AccountId),
    #[error("Account {0} is not linked to an aggregator item")]
    NotLinked(AccountId),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("External extraction is not configured")]
    ExtractionUnavailable,
    #[error(transparent)]
    Aggregator(#[from] AggregatorError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Timed out while {0}")]
    Timeout(&'static str),
}

#[derive(Debug, Error)]
pub enum SettleError {
    #[error("Settlement rejected: {0}")]
    Rejected(#[from] SettlementError),
    #[error("Settlement account {0} not found")]
    UnknownSettlementAccount(AccountId),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}
