use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use saldo_core::config::{DelimitedConfig, Limits, SyncConfig};
use saldo_core::{
    validate, AccountId, BankAccount, CategorizationMode, CategorizedRecord, CategoryId, Confidence,
    EngineConfig, Money, NewTransaction, ReconciliationEvent, ReconciliationStatus,
    RawStatementFile, Settlement, SourceTag, StatementFormat, SyncUpdate, TransactionId,
    ValidationOutcome,
};
use saldo_extract::{ExtractionAdapter, ExtractionBackend};
use saldo_import::aggregator::parse_snapshot;
use saldo_import::{
    dedup_window, detect_duplicates, AggregatorSnapshot, Categorizer, KeywordDictionary,
    ParseOutcome, ParseSummary,
};
use saldo_storage::{Datastore, NewImportLog};

use crate::error::IngestError;
use crate::hash;

/// Where an ingestion's records come from.
#[derive(Debug, Clone)]
pub enum IngestSource {
    ManualFile(RawStatementFile),
    AggregatorPull(AggregatorSnapshot),
    AggregatorWebhook(AggregatorSnapshot),
}

impl IngestSource {
    pub fn tag(&self) -> SourceTag {
        match self {
            IngestSource::ManualFile(file) => file.format.source_tag(),
            IngestSource::AggregatorPull(_) => SourceTag::AggregatorPull,
            IngestSource::AggregatorWebhook(_) => SourceTag::AggregatorWebhook,
        }
    }
}

/// Keyword match that `safe` mode held back for the user to confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSuggestion {
    pub transaction_id: TransactionId,
    pub category_id: Option<CategoryId>,
    pub category_name: String,
}

/// Outcome of one ingestion. Counts are accurate even when the call
/// stopped early.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// What the parser produced, before validation and dedup.
    pub parsed: ParseSummary,
    pub imported: usize,
    pub skipped_duplicates: usize,
    pub invalid_count: usize,
    pub new_balance: Option<Money>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub pending_confirmation: Vec<PendingSuggestion>,
    /// DDA instruments refreshed alongside an aggregator pull.
    pub dda_synced: usize,
}

/// Runs `fut` against the optional deadline. `stage` names the step in the
/// timeout error.
pub(crate) async fn within<T>(
    deadline: Option<Instant>,
    stage: &'static str,
    fut: impl Future<Output = T>,
) -> Result<T, IngestError> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| IngestError::Timeout(stage)),
        None => Ok(fut.await),
    }
}

/// A timeout too large to represent as an instant means no deadline.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Drives one ingestion end to end: parse, validate, categorize, dedup,
/// persist, then touch the account row for aggregator sources.
///
/// Same-account ingestions must be serialised by the caller (see
/// [`crate::gate::AccountGate`]); the snapshot-then-insert sequence is not
/// isolated.
pub struct SyncCoordinator<S: Datastore> {
    store: S,
    delimited: DelimitedConfig,
    limits: Limits,
    pub(crate) sync: SyncConfig,
    pub(crate) mode: CategorizationMode,
    pub(crate) keywords: KeywordDictionary,
    extractor: Option<ExtractionAdapter<Box<dyn ExtractionBackend>>>,
    today: Option<NaiveDate>,
}

impl<S: Datastore> SyncCoordinator<S> {
    pub fn new(store: S, config: &EngineConfig) -> Self {
        Self {
            store,
            delimited: config.delimited.clone(),
            limits: config.limits,
            sync: config.sync.clone(),
            mode: config.categorization.mode,
            keywords: KeywordDictionary::builtin(),
            extractor: None,
            today: None,
        }
    }

    pub fn with_keywords(mut self, keywords: KeywordDictionary) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_extractor(mut self, backend: Box<dyn ExtractionBackend>) -> Self {
        self.extractor = Some(ExtractionAdapter::new(backend, &self.limits));
        self
    }

    /// Pins the ingestion day used to tell scheduled records from pending ones.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub async fn ingest(
        &self,
        source: IngestSource,
        account: AccountId,
    ) -> Result<IngestReport, IngestError> {
        self.run(source, account, None).await
    }

    /// Like [`ingest`](Self::ingest) but bounded: a timeout while parsing or
    /// reading fails the call before anything is written; a timeout while
    /// persisting stops the loop and reports what was already committed.
    pub async fn ingest_with_timeout(
        &self,
        source: IngestSource,
        account: AccountId,
        timeout: Duration,
    ) -> Result<IngestReport, IngestError> {
        self.run(source, account, deadline_after(timeout)).await
    }

    pub(crate) async fn run(
        &self,
        source: IngestSource,
        account_id: AccountId,
        deadline: Option<Instant>,
    ) -> Result<IngestReport, IngestError> {
        let account = within(deadline, "loading the account", self.store.account(account_id))
            .await??
            .ok_or(IngestError::UnknownAccount(account_id))?;

        let tag = source.tag();
        let result = self.ingest_account(&account, source, tag, deadline).await;

        if tag.is_aggregator() {
            if let Err(e) = &result {
                warn!(account = %account_id, error = %e, "Aggregator ingestion failed");
                let update = SyncUpdate::Failed { message: e.to_string() };
                if let Err(store_err) = self.store.update_account_sync(account_id, &update).await {
                    warn!(account = %account_id, error = %store_err, "Could not record sync error");
                }
            }
        }
        result
    }

    async fn ingest_account(
        &self,
        account: &BankAccount,
        source: IngestSource,
        tag: SourceTag,
        deadline: Option<Instant>,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();

        // Manual uploads are fingerprinted for the import log.
        let manual = match &source {
            IngestSource::ManualFile(file) => Some((file.format, hash::fingerprint(&file.bytes))),
            _ => None,
        };
        let balance = match &source {
            IngestSource::AggregatorPull(s) | IngestSource::AggregatorWebhook(s) => s.balance,
            IngestSource::ManualFile(_) => None,
        };

        // 1. parse: any failure aborts before persistence
        let parsed = within(deadline, "parsing", self.parse(source)).await?;
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                if let Some((format, file_hash)) = &manual {
                    self.log_import(account, *format, file_hash, &report, 0, Some(e.to_string()))
                        .await;
                }
                return Err(e);
            }
        };
        report.parsed = parsed.summary();
        let total_records = parsed.records.len();
        report.errors.extend(parsed.errors);
        report.warnings.extend(parsed.warnings);

        if let Some((_, file_hash)) = &manual {
            let lookup = self.store.find_import_by_hash(account.id, file_hash);
            if let Some(previous) = within(deadline, "checking the import log", lookup).await?? {
                report.warnings.push(format!(
                    "This file was already imported on {} ({} transactions)",
                    previous.created_at, previous.imported
                ));
            }
        }

        // 2. validate
        let mut valid = Vec::with_capacity(parsed.records.len());
        for record in parsed.records {
            match validate(record) {
                ValidationOutcome::Valid(v) => valid.push(v),
                ValidationOutcome::Invalid { record, reason } => {
                    report.invalid_count += 1;
                    report.warnings.push(format!(
                        "Record skipped ({} {}): {reason}",
                        record.date, record.description
                    ));
                }
            }
        }

        // 3. categorize
        let categories = within(deadline, "loading categories", self.store.categories(account.user_id));
        let rules = within(deadline, "loading rules", self.store.rules(account.user_id));
        let categorizer = Categorizer::new(categories.await??, rules.await??, self.keywords.clone());
        let categorized = categorizer.categorize_all(valid);

        // 4. dedup against what is already stored in the batch's window
        let existing = match dedup_window(&categorized) {
            Some(window) => {
                let stored = self.store.transactions_in_range(account.id, window);
                within(deadline, "loading stored transactions", stored).await??
            }
            None => Vec::new(),
        };
        let split = detect_duplicates(account.id, categorized, &existing);
        for (record, existing_id) in &split.duplicates {
            debug!(
                account = %account.id,
                date = %record.record.date,
                description = record.record.description(),
                duplicate_of = %existing_id,
                "Skipping likely duplicate"
            );
        }
        report.skipped_duplicates = split.duplicates.len();

        // 5. persist, record by record
        let today = self.today();
        let total_unique = split.unique.len();
        for (done, record) in split.unique.into_iter().enumerate() {
            let new_tx = self.new_transaction(account.id, &record, tag, today);
            let insert = self.insert(&new_tx, tag);
            let outcome = match deadline {
                Some(at) => match tokio::time::timeout_at(at, insert).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        report.errors.push(format!(
                            "Timed out after persisting {done} of {total_unique} records"
                        ));
                        break;
                    }
                },
                None => insert.await,
            };
            match outcome {
                Ok(Some(id)) => {
                    report.imported += 1;
                    if record.needs_confirmation(self.mode) {
                        if let Some(name) = record.suggested_category.clone() {
                            report.pending_confirmation.push(PendingSuggestion {
                                transaction_id: id,
                                category_id: record.category_id,
                                category_name: name,
                            });
                        }
                    }
                }
                Ok(None) => report.skipped_duplicates += 1,
                Err(e) => {
                    warn!(
                        account = %account.id,
                        description = record.record.description(),
                        error = %e,
                        "Failed to persist record"
                    );
                    report.errors.push(format!(
                        "Failed to save '{}' ({}): {e}",
                        record.record.description(),
                        record.record.date
                    ));
                }
            }
        }

        // 6. account side effects
        if tag.is_aggregator() {
            match balance {
                Some(balance) => {
                    let update = SyncUpdate::Succeeded { balance, at: Utc::now() };
                    let write = self.store.update_account_sync(account.id, &update);
                    match within(deadline, "updating the account balance", write)
                        .await
                        .and_then(|r| r.map_err(IngestError::from))
                    {
                        Ok(()) => report.new_balance = Some(balance),
                        Err(e) => {
                            warn!(account = %account.id, error = %e, "Failed to update balance");
                            report.errors.push(format!("Failed to update account balance: {e}"));
                        }
                    }
                }
                None => report
                    .warnings
                    .push("Aggregator reported no balance; account balance unchanged".to_string()),
            }
        }
        if let Some((format, file_hash)) = &manual {
            self.log_import(account, *format, file_hash, &report, total_records, None)
                .await;
        }

        info!(
            account = %account.id,
            source = %tag,
            imported = report.imported,
            duplicates = report.skipped_duplicates,
            invalid = report.invalid_count,
            errors = report.errors.len(),
            "Ingestion complete"
        );
        Ok(report)
    }

    async fn parse(&self, source: IngestSource) -> Result<ParseOutcome, IngestError> {
        match source {
            IngestSource::ManualFile(file) => match file.format {
                StatementFormat::ExternalExtraction => {
                    let adapter = self
                        .extractor
                        .as_ref()
                        .ok_or(IngestError::ExtractionUnavailable)?;
                    Ok(adapter.extract(&file.bytes).await?)
                }
                format => Ok(saldo_import::import::parse_statement(
                    &file.bytes,
                    format,
                    &self.delimited,
                    &self.limits,
                )?),
            },
            IngestSource::AggregatorPull(snapshot) | IngestSource::AggregatorWebhook(snapshot) => {
                Ok(parse_snapshot(&snapshot))
            }
        }
    }

    async fn insert(
        &self,
        tx: &NewTransaction,
        tag: SourceTag,
    ) -> Result<Option<TransactionId>, saldo_storage::StoreError> {
        if tag == SourceTag::AggregatorWebhook {
            self.store.insert_transaction_if_absent(tx).await
        } else {
            self.store.insert_transaction(tx).await.map(Some)
        }
    }

    fn new_transaction(
        &self,
        account: AccountId,
        record: &CategorizedRecord,
        tag: SourceTag,
        today: NaiveDate,
    ) -> NewTransaction {
        let valid = &record.record;
        let mut status = ReconciliationStatus::initial(valid.date, today);
        let mut settlement = None;
        if valid.record.cleared && status == ReconciliationStatus::Pending {
            let cleared = Settlement { date: valid.date, account_id: account };
            if let Ok(next) = status.apply(&ReconciliationEvent::Settle(cleared)) {
                status = next;
                settlement = Some(cleared);
            }
        }

        let category_id = record.applied_category(self.mode);
        NewTransaction {
            account_id: account,
            date: valid.date,
            description: valid.record.description.clone(),
            amount: valid.record.amount,
            direction: valid.record.direction,
            category_id,
            category_confidence: if category_id.is_some() {
                record.confidence
            } else {
                Confidence::None
            },
            reconciliation_status: status,
            settlement_date: settlement.map(|s| s.date),
            settlement_account_id: settlement.map(|s| s.account_id),
            source: tag,
            origin_external_id: valid.record.external_document_id.clone(),
        }
    }

    async fn log_import(
        &self,
        account: &BankAccount,
        format: StatementFormat,
        file_hash: &str,
        report: &IngestReport,
        total_records: usize,
        error: Option<String>,
    ) {
        let log = NewImportLog {
            user_id: account.user_id,
            account_id: account.id,
            format,
            file_hash: file_hash.to_string(),
            total_records,
            imported: report.imported,
            duplicates: report.skipped_duplicates,
            invalid: report.invalid_count,
            error,
        };
        if let Err(e) = self.store.record_import(&log).await {
            warn!(account = %account.id, error = %e, "Failed to record import log");
        }
    }
}
