//! Reconciliation lifecycle: `pending` / `scheduled` → `settled`.
//!
//! `settled` is terminal. Settlement ("baixa") batches are checked here
//! before anything is written, so a rejected batch never mutates a record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::account::AccountId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Pending,
    Scheduled,
    Settled,
}

impl ReconciliationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconciliationStatus::Pending => "pending",
            ReconciliationStatus::Scheduled => "scheduled",
            ReconciliationStatus::Settled => "settled",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ReconciliationStatus::Settled
    }

    /// Status of a freshly imported record: future-dated records are scheduled.
    pub fn initial(date: NaiveDate, today: NaiveDate) -> Self {
        if date > today {
            ReconciliationStatus::Scheduled
        } else {
            ReconciliationStatus::Pending
        }
    }

    pub fn apply(self, event: &ReconciliationEvent) -> Result<Self, TransitionError> {
        use ReconciliationStatus::*;
        match (self, event) {
            (Settled, _) => Err(TransitionError::AlreadySettled),
            (Pending | Scheduled, ReconciliationEvent::Schedule { .. }) => Ok(Scheduled),
            (Pending | Scheduled, ReconciliationEvent::Settle(_)) => Ok(Settled),
        }
    }
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReconciliationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReconciliationStatus::Pending),
            "scheduled" => Ok(ReconciliationStatus::Scheduled),
            "settled" => Ok(ReconciliationStatus::Settled),
            other => Err(format!("Unknown reconciliation status: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub date: NaiveDate,
    pub account_id: AccountId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationEvent {
    Schedule { due_date: NaiveDate },
    Settle(Settlement),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("record is already settled")]
    AlreadySettled,
}

/// Kind of record a settlement item points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A transaction imported or entered by hand.
    Transaction,
    /// An externally tracked payable instrument (DDA boleto).
    Dda,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Transaction => write!(f, "transaction"),
            RecordKind::Dda => write!(f, "dda"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementItem {
    pub id: i64,
    pub kind: RecordKind,
    /// Overrides the batch-level settlement account for this item.
    #[serde(default)]
    pub settlement_account_id: Option<AccountId>,
}

impl SettlementItem {
    pub fn new(id: i64, kind: RecordKind) -> Self {
        SettlementItem { id, kind, settlement_account_id: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBatch {
    pub items: Vec<SettlementItem>,
    pub settlement_date: Option<NaiveDate>,
    pub settlement_account_id: Option<AccountId>,
}

/// A batch whose required fields are all present and consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettlement {
    pub settlement: Settlement,
    pub transaction_ids: Vec<i64>,
    pub dda_ids: Vec<i64>,
}

impl ResolvedSettlement {
    pub fn len(&self) -> usize {
        self.transaction_ids.len() + self.dda_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error("settlement batch is empty")]
    EmptyBatch,
    #[error("settlement date is required")]
    MissingSettlementDate,
    #[error("{kind} {id} has no settlement account")]
    MissingSettlementAccount { id: i64, kind: RecordKind },
    #[error("items in one batch must share a settlement account")]
    InconsistentSettlementAccount,
    #[error("{kind} {id} appears twice in the batch")]
    DuplicateItem { id: i64, kind: RecordKind },
    #[error("{kind} {id} not found")]
    UnknownRecord { id: i64, kind: RecordKind },
    #[error("{kind} {id}: {source}")]
    Transition {
        id: i64,
        kind: RecordKind,
        #[source]
        source: TransitionError,
    },
}

impl SettlementBatch {
    /// Checks required fields for every item. Nothing is written on `Err`.
    pub fn resolve(&self) -> Result<ResolvedSettlement, SettlementError> {
        if self.items.is_empty() {
            return Err(SettlementError::EmptyBatch);
        }
        let date = self
            .settlement_date
            .ok_or(SettlementError::MissingSettlementDate)?;

        let mut account: Option<AccountId> = None;
        let mut seen = HashSet::new();
        let mut transaction_ids = Vec::new();
        let mut dda_ids = Vec::new();

        for item in &self.items {
            if !seen.insert((item.kind, item.id)) {
                return Err(SettlementError::DuplicateItem { id: item.id, kind: item.kind });
            }
            let resolved = item
                .settlement_account_id
                .or(self.settlement_account_id)
                .ok_or(SettlementError::MissingSettlementAccount { id: item.id, kind: item.kind })?;
            match account {
                None => account = Some(resolved),
                Some(a) if a != resolved => {
                    return Err(SettlementError::InconsistentSettlementAccount)
                }
                Some(_) => {}
            }
            match item.kind {
                RecordKind::Transaction => transaction_ids.push(item.id),
                RecordKind::Dda => dda_ids.push(item.id),
            }
        }

        let account_id = account.ok_or(SettlementError::EmptyBatch)?;
        Ok(ResolvedSettlement {
            settlement: Settlement { date, account_id },
            transaction_ids,
            dda_ids,
        })
    }
}

/// Checks that every record in a resolved batch can take the settle
/// transition. `current` yields the stored status for each item, `None`
/// when the record does not exist.
pub fn check_transitions<'a, I>(
    resolved: &ResolvedSettlement,
    current: I,
) -> Result<(), SettlementError>
where
    I: IntoIterator<Item = (i64, RecordKind, Option<&'a ReconciliationStatus>)>,
{
    let event = ReconciliationEvent::Settle(resolved.settlement);
    for (id, kind, status) in current {
        let status = status.ok_or(SettlementError::UnknownRecord { id, kind })?;
        status
            .apply(&event)
            .map_err(|source| SettlementError::Transition { id, kind, source })?;
    }
    Ok(())
}
