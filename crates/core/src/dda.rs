use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::{AccountId, UserId};
use crate::money::Money;
use crate::reconciliation::ReconciliationStatus;

/// Lifecycle of a direct-debit payment instrument (boleto).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DdaStatus {
    Pending,
    Paid,
}

impl DdaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DdaStatus::Pending => "pending",
            DdaStatus::Paid => "paid",
        }
    }

    /// Paid instruments are as final as a settled transaction.
    pub fn reconciliation(self) -> ReconciliationStatus {
        match self {
            DdaStatus::Pending => ReconciliationStatus::Pending,
            DdaStatus::Paid => ReconciliationStatus::Settled,
        }
    }
}

impl fmt::Display for DdaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DdaStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DdaStatus::Pending),
            "paid" => Ok(DdaStatus::Paid),
            other => Err(format!("Unknown DDA status: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdaInstrument {
    pub id: i64,
    pub user_id: UserId,
    pub description: String,
    pub amount: Money,
    pub due_date: NaiveDate,
    pub status: DdaStatus,
    pub payment_date: Option<NaiveDate>,
    pub settlement_account_id: Option<AccountId>,
}

/// A boleto reported by the aggregator, keyed by its provider id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDdaInstrument {
    pub user_id: UserId,
    pub external_id: String,
    pub account_id: Option<AccountId>,
    pub description: String,
    pub amount: Money,
    pub due_date: NaiveDate,
    pub status: DdaStatus,
    pub digitable_line: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for s in [DdaStatus::Pending, DdaStatus::Paid] {
            assert_eq!(s.as_str().parse::<DdaStatus>(), Ok(s));
        }
        assert!("overdue".parse::<DdaStatus>().is_err());
    }

    #[test]
    fn paid_maps_to_settled() {
        assert!(DdaStatus::Paid.reconciliation().is_terminal());
        assert!(!DdaStatus::Pending.reconciliation().is_terminal());
    }
}
