use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use saldo_core::{
    AccountId, BankAccount, Category, CategoryId, Confidence, DateRange, NewDdaInstrument, NewTransaction,
    RecordKind, ReconciliationStatus, ResolvedSettlement, StatementFormat, StoredTransaction,
    SyncUpdate, TransactionId, UserId, UserRule,
};

use crate::error::StoreError;

/// One row of the manual import log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportLog {
    pub id: i64,
    pub account_id: AccountId,
    pub format: StatementFormat,
    pub file_hash: String,
    pub imported: usize,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImportLog {
    pub user_id: UserId,
    pub account_id: AccountId,
    pub format: StatementFormat,
    pub file_hash: String,
    pub total_records: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub error: Option<String>,
}

/// Current reconciliation state of a record a settlement batch names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementState {
    pub id: i64,
    pub kind: RecordKind,
    pub status: ReconciliationStatus,
}

/// Everything the engine reads from or writes to persistent storage.
///
/// Reads that take a `UserId` only see that user's rows; a row owned by
/// someone else looks exactly like a missing one.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn account(&self, id: AccountId) -> Result<Option<BankAccount>, StoreError>;

    async fn accounts_for_item(&self, item_id: &str) -> Result<Vec<BankAccount>, StoreError>;

    async fn categories(&self, user: UserId) -> Result<Vec<Category>, StoreError>;

    async fn rules(&self, user: UserId) -> Result<Vec<UserRule>, StoreError>;

    async fn transactions_in_range(
        &self,
        account: AccountId,
        range: DateRange,
    ) -> Result<Vec<StoredTransaction>, StoreError>;

    async fn insert_transaction(&self, tx: &NewTransaction) -> Result<TransactionId, StoreError>;

    /// Inserts unless a row with the same `(account, date, description,
    /// amount)` or the same `(account, origin_external_id)` exists.
    /// `None` means the row was already there.
    async fn insert_transaction_if_absent(
        &self,
        tx: &NewTransaction,
    ) -> Result<Option<TransactionId>, StoreError>;

    async fn update_account_sync(
        &self,
        account: AccountId,
        update: &SyncUpdate,
    ) -> Result<(), StoreError>;

    /// Inserts or refreshes a boleto keyed by `(user, external_id)`. Paid
    /// instruments are left as they are. Returns the row id.
    async fn upsert_dda(&self, dda: &NewDdaInstrument) -> Result<i64, StoreError>;

    async fn settlement_states(
        &self,
        user: UserId,
        transaction_ids: &[i64],
        dda_ids: &[i64],
    ) -> Result<Vec<SettlementState>, StoreError>;

    /// Applies a checked settlement atomically: either every named record
    /// is settled or none is.
    async fn apply_settlement(&self, resolved: &ResolvedSettlement) -> Result<(), StoreError>;

    async fn uncategorized_transactions(
        &self,
        user: UserId,
    ) -> Result<Vec<StoredTransaction>, StoreError>;

    /// Bulk category assignment. Returns the number of rows changed.
    async fn assign_categories(
        &self,
        assignments: &[(TransactionId, CategoryId, Confidence)],
    ) -> Result<u64, StoreError>;

    async fn unlinked_transactions_since(
        &self,
        user: UserId,
        since: NaiveDate,
    ) -> Result<Vec<StoredTransaction>, StoreError>;

    /// Links two transactions to each other as halves of one transfer.
    async fn link_transfer(&self, a: TransactionId, b: TransactionId) -> Result<(), StoreError>;

    async fn find_import_by_hash(
        &self,
        account: AccountId,
        file_hash: &str,
    ) -> Result<Option<ImportLog>, StoreError>;

    async fn record_import(&self, log: &NewImportLog) -> Result<i64, StoreError>;
}
