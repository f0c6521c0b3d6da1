use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use saldo_core::{
    AccountId, BankAccount, Category, CategoryId, Confidence, DateRange, DdaInstrument,
    DdaStatus, Money, NewDdaInstrument, NewTransaction, RecordKind, ReconciliationStatus, ResolvedSettlement,
    StoredTransaction, SyncUpdate, TransactionId, UserId, UserRule,
};

use crate::db::{create_db, DbPool};
use crate::error::StoreError;
use crate::store::{Datastore, ImportLog, NewImportLog, SettlementState};

const TX_COLUMNS: &str = "t.id, t.account_id, t.date, t.description, t.amount_cents, t.direction, \
    t.category_id, t.reconciliation_status, t.settlement_date, t.settlement_account_id, t.source, \
    t.origin_external_id, t.transfer_link_id";

const ACCOUNT_COLUMNS: &str = "id, user_id, name, balance_cents, last_sync_at, sync_error, \
    provider_item_id, provider_account_id";

type TxRow = (
    i64,
    i64,
    String,
    String,
    i64,
    String,
    Option<i64>,
    String,
    Option<String>,
    Option<i64>,
    String,
    Option<String>,
    Option<i64>,
);

type AccountRow = (
    i64,
    i64,
    String,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

type DdaRow = (i64, i64, String, i64, String, String, Option<String>, Option<i64>);

fn parse_date(table: &'static str, id: i64, s: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| StoreError::Corrupt {
        table,
        id,
        detail: format!("date '{s}': {e}"),
    })
}

fn parse_text<T: FromStr<Err = String>>(table: &'static str, id: i64, s: &str) -> Result<T, StoreError> {
    s.parse().map_err(|detail| StoreError::Corrupt { table, id, detail })
}

fn tx_from_row(r: TxRow) -> Result<StoredTransaction, StoreError> {
    let id = r.0;
    Ok(StoredTransaction {
        id: TransactionId(id),
        account_id: AccountId(r.1),
        date: parse_date("transactions", id, &r.2)?,
        description: r.3,
        amount: Money::from_cents(r.4),
        direction: parse_text("transactions", id, &r.5)?,
        category_id: r.6.map(CategoryId),
        reconciliation_status: parse_text("transactions", id, &r.7)?,
        settlement_date: r
            .8
            .as_deref()
            .map(|d| parse_date("transactions", id, d))
            .transpose()?,
        settlement_account_id: r.9.map(AccountId),
        source: parse_text("transactions", id, &r.10)?,
        origin_external_id: r.11,
        transfer_link_id: r.12.map(TransactionId),
    })
}

fn account_from_row(r: AccountRow) -> Result<BankAccount, StoreError> {
    let id = r.0;
    let last_sync_at = r
        .4
        .as_deref()
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::Corrupt {
                    table: "bank_accounts",
                    id,
                    detail: format!("last_sync_at '{s}': {e}"),
                })
        })
        .transpose()?;
    Ok(BankAccount {
        id: AccountId(id),
        user_id: UserId(r.1),
        name: r.2,
        current_balance: Money::from_cents(r.3),
        last_sync_at,
        sync_error: r.5,
        provider_item_id: r.6,
        provider_account_id: r.7,
    })
}

fn dda_from_row(r: DdaRow) -> Result<DdaInstrument, StoreError> {
    let id = r.0;
    Ok(DdaInstrument {
        id,
        user_id: UserId(r.1),
        description: r.2,
        amount: Money::from_cents(r.3),
        due_date: parse_date("dda_instruments", id, &r.4)?,
        status: parse_text("dda_instruments", id, &r.5)?,
        payment_date: r
            .6
            .as_deref()
            .map(|d| parse_date("dda_instruments", id, d))
            .transpose()?,
        settlement_account_id: r.7.map(AccountId),
    })
}

fn bind_new_transaction<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    tx: &'q NewTransaction,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let reconciled = i64::from(tx.reconciliation_status == ReconciliationStatus::Settled);
    query
        .bind(tx.account_id.0)
        .bind(tx.date.to_string())
        .bind(&tx.description)
        .bind(tx.amount.to_cents())
        .bind(tx.direction.as_str())
        .bind(tx.category_id.map(|c| c.0))
        .bind(tx.category_confidence.as_str())
        .bind(tx.reconciliation_status.as_str())
        .bind(reconciled)
        .bind(tx.settlement_date.map(|d| d.to_string()))
        .bind(tx.settlement_account_id.map(|a| a.0))
        .bind(tx.source.as_str())
        .bind(tx.origin_external_id.as_deref())
}

const INSERT_COLUMNS: &str = "account_id, date, description, amount_cents, direction, category_id, \
    category_confidence, reconciliation_status, reconciled, settlement_date, settlement_account_id, \
    source, origin_external_id";

/// SQLite-backed [`Datastore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(create_db(path).await?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    // ── setup helpers (accounts, categories and DDAs are owned elsewhere) ──

    pub async fn create_account(
        &self,
        user: UserId,
        name: &str,
        provider_item_id: Option<&str>,
        provider_account_id: Option<&str>,
    ) -> Result<AccountId, StoreError> {
        let result = sqlx::query(
            "INSERT INTO bank_accounts (user_id, name, provider_item_id, provider_account_id) VALUES (?, ?, ?, ?)",
        )
        .bind(user.0)
        .bind(name)
        .bind(provider_item_id)
        .bind(provider_account_id)
        .execute(&self.pool)
        .await?;
        Ok(AccountId(result.last_insert_rowid()))
    }

    pub async fn create_category(&self, user: UserId, name: &str) -> Result<CategoryId, StoreError> {
        let result = sqlx::query("INSERT INTO categories (user_id, name) VALUES (?, ?)")
            .bind(user.0)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(CategoryId(result.last_insert_rowid()))
    }

    pub async fn create_rule(&self, user: UserId, rule: &UserRule) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO category_rules (user_id, pattern, category_id, priority) VALUES (?, ?, ?, ?)",
        )
        .bind(user.0)
        .bind(&rule.pattern)
        .bind(rule.category_id.0)
        .bind(rule.priority)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn create_dda(
        &self,
        user: UserId,
        description: &str,
        amount: Money,
        due_date: NaiveDate,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO dda_instruments (user_id, description, amount_cents, due_date) VALUES (?, ?, ?, ?)",
        )
        .bind(user.0)
        .bind(description)
        .bind(amount.to_cents())
        .bind(due_date.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn dda(&self, id: i64) -> Result<Option<DdaInstrument>, StoreError> {
        let row = sqlx::query_as::<_, DdaRow>(
            "SELECT id, user_id, description, amount_cents, due_date, status, payment_date, settlement_account_id FROM dda_instruments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(dda_from_row).transpose()
    }

    pub async fn ddas(&self, user: UserId) -> Result<Vec<DdaInstrument>, StoreError> {
        sqlx::query_as::<_, DdaRow>(
            "SELECT id, user_id, description, amount_cents, due_date, status, payment_date, settlement_account_id FROM dda_instruments WHERE user_id = ? ORDER BY due_date, id",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(dda_from_row)
        .collect()
    }

    pub async fn transaction(&self, id: TransactionId) -> Result<Option<StoredTransaction>, StoreError> {
        let sql = format!("SELECT {TX_COLUMNS} FROM transactions t WHERE t.id = ?");
        let row = sqlx::query_as::<_, TxRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(tx_from_row).transpose()
    }

    pub async fn category_confidence(&self, id: TransactionId) -> Result<Option<Confidence>, StoreError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT category_confidence FROM transactions WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| parse_text("transactions", id.0, &r.0)).transpose()
    }

    /// Runs `select` (ending in an owner comparison) restricted to `ids`.
    async fn statuses_for(
        &self,
        select: &str,
        id_column: &str,
        user: UserId,
        ids: &[i64],
    ) -> Result<Vec<(i64, String)>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(select);
        qb.push_bind(user.0);
        qb.push(format!(" AND {id_column} IN ("));
        let mut list = qb.separated(", ");
        for id in ids {
            list.push_bind(*id);
        }
        list.push_unseparated(")");
        Ok(qb.build_query_as::<(i64, String)>().fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl Datastore for SqliteStore {
    async fn account(&self, id: AccountId) -> Result<Option<BankAccount>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM bank_accounts WHERE id = ?");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(account_from_row).transpose()
    }

    async fn accounts_for_item(&self, item_id: &str) -> Result<Vec<BankAccount>, StoreError> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM bank_accounts WHERE provider_item_id = ? ORDER BY id"
        );
        let rows = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(account_from_row).collect()
    }

    async fn categories(&self, user: UserId) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, name FROM categories WHERE user_id = ? ORDER BY id",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| Category {
                id: CategoryId(r.0),
                user_id: user,
                name: r.1,
            })
            .collect())
    }

    async fn rules(&self, user: UserId) -> Result<Vec<UserRule>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64, i32)>(
            "SELECT pattern, category_id, priority FROM category_rules WHERE user_id = ? ORDER BY priority DESC, id",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| UserRule {
                pattern: r.0,
                category_id: CategoryId(r.1),
                priority: r.2,
            })
            .collect())
    }

    async fn transactions_in_range(
        &self,
        account: AccountId,
        range: DateRange,
    ) -> Result<Vec<StoredTransaction>, StoreError> {
        let sql = format!(
            "SELECT {TX_COLUMNS} FROM transactions t WHERE t.account_id = ? AND t.date >= ? AND t.date <= ? ORDER BY t.date, t.id"
        );
        let rows = sqlx::query_as::<_, TxRow>(&sql)
            .bind(account.0)
            .bind(range.start.to_string())
            .bind(range.end.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(tx_from_row).collect()
    }

    async fn insert_transaction(&self, tx: &NewTransaction) -> Result<TransactionId, StoreError> {
        let sql = format!(
            "INSERT INTO transactions ({INSERT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        let result = bind_new_transaction(sqlx::query(&sql), tx)
            .execute(&self.pool)
            .await?;
        Ok(TransactionId(result.last_insert_rowid()))
    }

    async fn insert_transaction_if_absent(
        &self,
        tx: &NewTransaction,
    ) -> Result<Option<TransactionId>, StoreError> {
        let sql = format!(
            "INSERT INTO transactions ({INSERT_COLUMNS}) \
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ? \
             WHERE NOT EXISTS (SELECT 1 FROM transactions \
                 WHERE account_id = ? AND date = ? AND description = ? AND amount_cents = ?) \
             AND NOT EXISTS (SELECT 1 FROM transactions \
                 WHERE account_id = ? AND ? IS NOT NULL AND origin_external_id = ?)"
        );
        let result = bind_new_transaction(sqlx::query(&sql), tx)
            .bind(tx.account_id.0)
            .bind(tx.date.to_string())
            .bind(&tx.description)
            .bind(tx.amount.to_cents())
            .bind(tx.account_id.0)
            .bind(tx.origin_external_id.as_deref())
            .bind(tx.origin_external_id.as_deref())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(TransactionId(result.last_insert_rowid())))
    }

    async fn update_account_sync(
        &self,
        account: AccountId,
        update: &SyncUpdate,
    ) -> Result<(), StoreError> {
        match update {
            SyncUpdate::Succeeded { balance, at } => {
                sqlx::query(
                    "UPDATE bank_accounts SET balance_cents = ?, last_sync_at = ?, sync_error = NULL WHERE id = ?",
                )
                .bind(balance.to_cents())
                .bind(at.to_rfc3339())
                .bind(account.0)
                .execute(&self.pool)
                .await?;
            }
            SyncUpdate::Failed { message } => {
                sqlx::query("UPDATE bank_accounts SET sync_error = ? WHERE id = ?")
                    .bind(message)
                    .bind(account.0)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn upsert_dda(&self, dda: &NewDdaInstrument) -> Result<i64, StoreError> {
        let written = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO dda_instruments
                (user_id, external_id, account_id, description, amount_cents, due_date, status, digitable_line)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, external_id) DO UPDATE SET
                account_id = excluded.account_id,
                description = excluded.description,
                amount_cents = excluded.amount_cents,
                due_date = excluded.due_date,
                status = excluded.status,
                digitable_line = excluded.digitable_line
            WHERE dda_instruments.status = 'pending'
            RETURNING id
            "#,
        )
        .bind(dda.user_id.0)
        .bind(&dda.external_id)
        .bind(dda.account_id.map(|a| a.0))
        .bind(&dda.description)
        .bind(dda.amount.to_cents())
        .bind(dda.due_date.to_string())
        .bind(dda.status.as_str())
        .bind(&dda.digitable_line)
        .fetch_optional(&self.pool)
        .await?;
        if let Some((id,)) = written {
            return Ok(id);
        }

        let (id,): (i64,) =
            sqlx::query_as("SELECT id FROM dda_instruments WHERE user_id = ? AND external_id = ?")
                .bind(dda.user_id.0)
                .bind(&dda.external_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(id)
    }

    async fn settlement_states(
        &self,
        user: UserId,
        transaction_ids: &[i64],
        dda_ids: &[i64],
    ) -> Result<Vec<SettlementState>, StoreError> {
        let mut states = Vec::with_capacity(transaction_ids.len() + dda_ids.len());

        let rows = self
            .statuses_for(
                "SELECT t.id, t.reconciliation_status FROM transactions t \
                 JOIN bank_accounts a ON a.id = t.account_id WHERE a.user_id = ",
                "t.id",
                user,
                transaction_ids,
            )
            .await?;
        for (id, status) in rows {
            states.push(SettlementState {
                id,
                kind: RecordKind::Transaction,
                status: parse_text("transactions", id, &status)?,
            });
        }

        let rows = self
            .statuses_for(
                "SELECT id, status FROM dda_instruments WHERE user_id = ",
                "id",
                user,
                dda_ids,
            )
            .await?;
        for (id, status) in rows {
            let status: DdaStatus = parse_text("dda_instruments", id, &status)?;
            states.push(SettlementState {
                id,
                kind: RecordKind::Dda,
                status: status.reconciliation(),
            });
        }

        Ok(states)
    }

    async fn apply_settlement(&self, resolved: &ResolvedSettlement) -> Result<(), StoreError> {
        let date = resolved.settlement.date.to_string();
        let account = resolved.settlement.account_id.0;
        let mut tx = self.pool.begin().await?;

        if !resolved.transaction_ids.is_empty() {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "UPDATE transactions SET reconciliation_status = 'settled', reconciled = 1, settlement_date = ",
            );
            qb.push_bind(date.clone());
            qb.push(", settlement_account_id = ");
            qb.push_bind(account);
            qb.push(" WHERE reconciliation_status != 'settled' AND id IN (");
            let mut list = qb.separated(", ");
            for id in &resolved.transaction_ids {
                list.push_bind(*id);
            }
            list.push_unseparated(")");
            let changed = qb.build().execute(&mut *tx).await?.rows_affected();
            if changed != resolved.transaction_ids.len() as u64 {
                tx.rollback().await?;
                return Err(StoreError::Conflict(format!(
                    "{changed} of {} transactions were still open",
                    resolved.transaction_ids.len()
                )));
            }
        }

        if !resolved.dda_ids.is_empty() {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "UPDATE dda_instruments SET status = 'paid', payment_date = ",
            );
            qb.push_bind(date);
            qb.push(", settlement_account_id = ");
            qb.push_bind(account);
            qb.push(" WHERE status != 'paid' AND id IN (");
            let mut list = qb.separated(", ");
            for id in &resolved.dda_ids {
                list.push_bind(*id);
            }
            list.push_unseparated(")");
            let changed = qb.build().execute(&mut *tx).await?.rows_affected();
            if changed != resolved.dda_ids.len() as u64 {
                tx.rollback().await?;
                return Err(StoreError::Conflict(format!(
                    "{changed} of {} DDA instruments were still open",
                    resolved.dda_ids.len()
                )));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn uncategorized_transactions(
        &self,
        user: UserId,
    ) -> Result<Vec<StoredTransaction>, StoreError> {
        let sql = format!(
            "SELECT {TX_COLUMNS} FROM transactions t JOIN bank_accounts a ON a.id = t.account_id \
             WHERE a.user_id = ? AND t.category_id IS NULL ORDER BY t.date, t.id"
        );
        let rows = sqlx::query_as::<_, TxRow>(&sql)
            .bind(user.0)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(tx_from_row).collect()
    }

    async fn assign_categories(
        &self,
        assignments: &[(TransactionId, CategoryId, Confidence)],
    ) -> Result<u64, StoreError> {
        let mut groups: HashMap<(CategoryId, Confidence), Vec<i64>> = HashMap::new();
        for (id, category, confidence) in assignments {
            groups.entry((*category, *confidence)).or_default().push(id.0);
        }

        let mut tx = self.pool.begin().await?;
        let mut changed = 0;
        for ((category, confidence), ids) in groups {
            let mut qb = QueryBuilder::<Sqlite>::new("UPDATE transactions SET category_id = ");
            qb.push_bind(category.0);
            qb.push(", category_confidence = ");
            qb.push_bind(confidence.as_str());
            qb.push(" WHERE category_id IS NULL AND id IN (");
            let mut list = qb.separated(", ");
            for id in ids {
                list.push_bind(id);
            }
            list.push_unseparated(")");
            changed += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(changed)
    }

    async fn unlinked_transactions_since(
        &self,
        user: UserId,
        since: NaiveDate,
    ) -> Result<Vec<StoredTransaction>, StoreError> {
        let sql = format!(
            "SELECT {TX_COLUMNS} FROM transactions t JOIN bank_accounts a ON a.id = t.account_id \
             WHERE a.user_id = ? AND t.transfer_link_id IS NULL AND t.date >= ? ORDER BY t.date, t.id"
        );
        let rows = sqlx::query_as::<_, TxRow>(&sql)
            .bind(user.0)
            .bind(since.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(tx_from_row).collect()
    }

    async fn link_transfer(&self, a: TransactionId, b: TransactionId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for (id, partner) in [(a, b), (b, a)] {
            sqlx::query("UPDATE transactions SET transfer_link_id = ? WHERE id = ?")
                .bind(partner.0)
                .bind(id.0)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_import_by_hash(
        &self,
        account: AccountId,
        file_hash: &str,
    ) -> Result<Option<ImportLog>, StoreError> {
        let row = sqlx::query_as::<_, (i64, i64, String, String, i64, String)>(
            "SELECT id, account_id, format, file_hash, imported, created_at FROM import_batches \
             WHERE account_id = ? AND file_hash = ? AND status = 'completed' ORDER BY id LIMIT 1",
        )
        .bind(account.0)
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| -> Result<ImportLog, StoreError> {
            Ok(ImportLog {
                id: r.0,
                account_id: AccountId(r.1),
                format: parse_text("import_batches", r.0, &r.2)?,
                file_hash: r.3,
                imported: usize::try_from(r.4).unwrap_or_default(),
                created_at: r.5,
            })
        })
        .transpose()
    }

    async fn record_import(&self, log: &NewImportLog) -> Result<i64, StoreError> {
        let status = if log.error.is_some() { "failed" } else { "completed" };
        let result = sqlx::query(
            "INSERT INTO import_batches (user_id, account_id, format, file_hash, total_records, imported, duplicates, invalid, status, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(log.user_id.0)
        .bind(log.account_id.0)
        .bind(log.format.as_str())
        .bind(&log.file_hash)
        .bind(log.total_records as i64)
        .bind(log.imported as i64)
        .bind(log.duplicates as i64)
        .bind(log.invalid as i64)
        .bind(status)
        .bind(log.error.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}
