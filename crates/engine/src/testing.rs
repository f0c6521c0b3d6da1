//! Test doubles shared by the engine's unit tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;

use saldo_core::{
    AccountId, BankAccount, Category, CategoryId, Confidence, DateRange, NewDdaInstrument, NewTransaction,
    ResolvedSettlement, StoredTransaction, SyncUpdate, TransactionId, UserId, UserRule,
};
use saldo_extract::{BackendError, ExtractionBackend};
use saldo_storage::{Datastore, ImportLog, NewImportLog, SettlementState, SqliteStore, StoreError};

pub const USER: UserId = UserId(1);

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Delegates to a real SQLite store but can be told to fail or stall.
pub struct FlakyStore {
    inner: SqliteStore,
    fail_inserts: Option<String>,
    slow_inserts: Option<(String, Duration)>,
    fail_range_reads: bool,
    slow_range_reads: Option<Duration>,
}

impl FlakyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            fail_inserts: None,
            slow_inserts: None,
            fail_range_reads: false,
            slow_range_reads: None,
        }
    }

    pub fn failing_inserts_matching(mut self, needle: &str) -> Self {
        self.fail_inserts = Some(needle.to_string());
        self
    }

    pub fn slow_inserts_matching(mut self, needle: &str, delay: Duration) -> Self {
        self.slow_inserts = Some((needle.to_string(), delay));
        self
    }

    pub fn failing_reads_in_range(mut self) -> Self {
        self.fail_range_reads = true;
        self
    }

    pub fn slow_reads_in_range(mut self, delay: Duration) -> Self {
        self.slow_range_reads = Some(delay);
        self
    }

    pub fn inner(&self) -> &SqliteStore {
        &self.inner
    }

    async fn before_insert(&self, tx: &NewTransaction) -> Result<(), StoreError> {
        if let Some((needle, delay)) = &self.slow_inserts {
            if tx.description.contains(needle.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }
        match &self.fail_inserts {
            Some(needle) if tx.description.contains(needle.as_str()) => {
                Err(StoreError::Conflict(format!("refused insert of '{}'", tx.description)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Datastore for FlakyStore {
    async fn account(&self, id: AccountId) -> Result<Option<BankAccount>, StoreError> {
        self.inner.account(id).await
    }

    async fn accounts_for_item(&self, item_id: &str) -> Result<Vec<BankAccount>, StoreError> {
        self.inner.accounts_for_item(item_id).await
    }

    async fn categories(&self, user: UserId) -> Result<Vec<Category>, StoreError> {
        self.inner.categories(user).await
    }

    async fn rules(&self, user: UserId) -> Result<Vec<UserRule>, StoreError> {
        self.inner.rules(user).await
    }

    async fn transactions_in_range(
        &self,
        account: AccountId,
        range: DateRange,
    ) -> Result<Vec<StoredTransaction>, StoreError> {
        if let Some(delay) = self.slow_range_reads {
            tokio::time::sleep(delay).await;
        }
        if self.fail_range_reads {
            return Err(StoreError::Conflict("range reads disabled".into()));
        }
        self.inner.transactions_in_range(account, range).await
    }

    async fn insert_transaction(&self, tx: &NewTransaction) -> Result<TransactionId, StoreError> {
        self.before_insert(tx).await?;
        self.inner.insert_transaction(tx).await
    }

    async fn insert_transaction_if_absent(
        &self,
        tx: &NewTransaction,
    ) -> Result<Option<TransactionId>, StoreError> {
        self.before_insert(tx).await?;
        self.inner.insert_transaction_if_absent(tx).await
    }

    async fn update_account_sync(&self, account: AccountId, update: &SyncUpdate) -> Result<(), StoreError> {
        self.inner.update_account_sync(account, update).await
    }

    async fn upsert_dda(&self, dda: &NewDdaInstrument) -> Result<i64, StoreError> {
        self.inner.upsert_dda(dda).await
    }

    async fn settlement_states(
        &self,
        user: UserId,
        transaction_ids: &[i64],
        dda_ids: &[i64],
    ) -> Result<Vec<SettlementState>, StoreError> {
        self.inner.settlement_states(user, transaction_ids, dda_ids).await
    }

    async fn apply_settlement(&self, resolved: &ResolvedSettlement) -> Result<(), StoreError> {
        self.inner.apply_settlement(resolved).await
    }

    async fn uncategorized_transactions(&self, user: UserId) -> Result<Vec<StoredTransaction>, StoreError> {
        self.inner.uncategorized_transactions(user).await
    }

    async fn assign_categories(
        &self,
        assignments: &[(TransactionId, CategoryId, Confidence)],
    ) -> Result<u64, StoreError> {
        self.inner.assign_categories(assignments).await
    }

    async fn unlinked_transactions_since(
        &self,
        user: UserId,
        since: NaiveDate,
    ) -> Result<Vec<StoredTransaction>, StoreError> {
        self.inner.unlinked_transactions_since(user, since).await
    }

    async fn link_transfer(&self, a: TransactionId, b: TransactionId) -> Result<(), StoreError> {
        self.inner.link_transfer(a, b).await
    }

    async fn find_import_by_hash(
        &self,
        account: AccountId,
        file_hash: &str,
    ) -> Result<Option<ImportLog>, StoreError> {
        self.inner.find_import_by_hash(account, file_hash).await
    }

    async fn record_import(&self, log: &NewImportLog) -> Result<i64, StoreError> {
        self.inner.record_import(log).await
    }
}

/// Transformer that never answers in time.
pub struct SlowBackend(pub Duration);

#[async_trait]
impl ExtractionBackend for SlowBackend {
    async fn extract(&self, _text: &str) -> Result<Vec<Value>, BackendError> {
        tokio::time::sleep(self.0).await;
        Ok(Vec::new())
    }
}
