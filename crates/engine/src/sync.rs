use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use saldo_core::{AccountId, BankAccount, SyncUpdate, UserId};
use saldo_import::aggregator::{boleto_to_dda, money_from_f64};
use saldo_import::{AggregatorSnapshot, ProviderAccount};
use saldo_storage::Datastore;

use crate::aggregator::{AggregatorClient, AggregatorError, WebhookEvent};
use crate::error::IngestError;
use crate::ingest::{deadline_after, within, IngestReport, IngestSource, SyncCoordinator};
use crate::transfers::link_transfers;

/// Per-account result of a webhook-triggered sync.
#[derive(Debug, Serialize)]
pub struct AccountSyncResult {
    pub account_id: AccountId,
    pub report: Option<IngestReport>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Ignored { event: String },
    Processed {
        accounts: Vec<AccountSyncResult>,
        dda_synced: usize,
        dda_error: Option<String>,
    },
}

impl<S: Datastore> SyncCoordinator<S> {
    /// Pulls balance and transactions for one linked account and ingests
    /// them, refreshes the item's DDA boletos, then pairs up internal
    /// transfers when enabled. The whole pull shares one deadline.
    pub async fn pull_account<A: AggregatorClient>(
        &self,
        client: &A,
        account_id: AccountId,
    ) -> Result<IngestReport, IngestError> {
        let deadline = deadline_after(self.timeout());
        let account = within(deadline, "loading the account", self.store().account(account_id))
            .await??
            .ok_or(IngestError::UnknownAccount(account_id))?;
        let (item_id, provider_id) = linked_ids(&account)?;

        let provider_accounts = match fetch(deadline, "fetching aggregator accounts", client.accounts(item_id)).await {
            Ok(accounts) => accounts,
            Err(e) => return Err(self.fail_sync(account_id, e).await),
        };
        let mut report = self
            .sync_linked(client, &account, provider_id, &provider_accounts, false, deadline)
            .await?;
        match self.sync_boletos(client, account.user_id, item_id, deadline).await {
            Ok(synced) => report.dda_synced = synced,
            Err(e) => report.warnings.push(format!("DDA boletos not refreshed: {e}")),
        }
        self.after_sync(&account).await;
        Ok(report)
    }

    /// Handles an aggregator notification. Only new-transaction and
    /// item-refresh events trigger a sync, which covers every local
    /// account linked to the item. One account failing does not stop the
    /// others.
    pub async fn handle_webhook<A: AggregatorClient>(
        &self,
        client: &A,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, IngestError> {
        if !event.is_actionable() {
            info!(event = %event.event, item = %event.item_id, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored { event: event.event.clone() });
        }

        let deadline = deadline_after(self.timeout());
        let linked = self.store().accounts_for_item(&event.item_id);
        let accounts = within(deadline, "loading item accounts", linked).await??;
        let Some(owner) = accounts.first().map(|a| a.user_id) else {
            warn!(item = %event.item_id, "Webhook for an item with no linked accounts");
            return Ok(WebhookOutcome::Processed {
                accounts: Vec::new(),
                dda_synced: 0,
                dda_error: None,
            });
        };

        let remote = fetch(deadline, "fetching aggregator accounts", client.accounts(&event.item_id));
        let provider_accounts = match remote.await {
            Ok(found) => found,
            Err(e) => {
                let message = e.to_string();
                for account in &accounts {
                    let update = SyncUpdate::Failed { message: message.clone() };
                    if let Err(store_err) = self.store().update_account_sync(account.id, &update).await {
                        warn!(account = %account.id, error = %store_err, "Could not record sync error");
                    }
                }
                return Err(e);
            }
        };

        let mut results = Vec::with_capacity(accounts.len());
        for account in &accounts {
            let outcome = match linked_ids(account) {
                Ok((_, provider_id)) => {
                    self.sync_linked(client, account, provider_id, &provider_accounts, true, deadline)
                        .await
                }
                Err(e) => Err(e),
            };
            results.push(match outcome {
                Ok(report) => AccountSyncResult { account_id: account.id, report: Some(report), error: None },
                Err(e) => AccountSyncResult { account_id: account.id, report: None, error: Some(e.to_string()) },
            });
        }
        let (dda_synced, dda_error) = match self.sync_boletos(client, owner, &event.item_id, deadline).await {
            Ok(synced) => (synced, None),
            Err(e) => (0, Some(e.to_string())),
        };
        if let Some(first) = accounts.first() {
            self.after_sync(first).await;
        }
        Ok(WebhookOutcome::Processed { accounts: results, dda_synced, dda_error })
    }

    /// Upserts the item's boletos for `user`. A boleto that cannot be mapped
    /// is skipped with a warning; a failed fetch or write fails the step.
    async fn sync_boletos<A: AggregatorClient>(
        &self,
        client: &A,
        user: UserId,
        item_id: &str,
        deadline: Option<Instant>,
    ) -> Result<usize, IngestError> {
        let boletos = fetch(deadline, "fetching DDA boletos", client.boletos(item_id)).await?;
        if boletos.is_empty() {
            return Ok(0);
        }
        let linked = self.store().accounts_for_item(item_id);
        let accounts = within(deadline, "loading item accounts", linked).await??;

        let mut synced = 0;
        for boleto in &boletos {
            let account = boleto.account_id.as_deref().and_then(|remote| {
                accounts
                    .iter()
                    .find(|a| a.user_id == user && a.provider_account_id.as_deref() == Some(remote))
                    .map(|a| a.id)
            });
            let dda = match boleto_to_dda(boleto, user, account) {
                Ok(dda) => dda,
                Err(reason) => {
                    warn!(item = item_id, %reason, "Skipping boleto");
                    continue;
                }
            };
            within(deadline, "saving DDA boletos", self.store().upsert_dda(&dda)).await??;
            synced += 1;
        }
        info!(item = item_id, synced, "DDA boletos refreshed");
        Ok(synced)
    }

    async fn sync_linked<A: AggregatorClient>(
        &self,
        client: &A,
        account: &BankAccount,
        provider_id: &str,
        provider_accounts: &[ProviderAccount],
        webhook: bool,
        deadline: Option<Instant>,
    ) -> Result<IngestReport, IngestError> {
        let Some(remote) = provider_accounts.iter().find(|a| a.id == provider_id) else {
            let err = AggregatorError::AccountNotFound(provider_id.to_string());
            return Err(self.fail_sync(account.id, err.into()).await);
        };
        let pending = fetch(deadline, "fetching aggregator transactions", client.transactions(provider_id));
        let transactions = match pending.await {
            Ok(txs) => txs,
            Err(e) => return Err(self.fail_sync(account.id, e).await),
        };

        let snapshot = AggregatorSnapshot {
            balance: money_from_f64(remote.balance),
            transactions,
            credit_card: remote.is_credit_card(),
        };
        let source = if webhook {
            IngestSource::AggregatorWebhook(snapshot)
        } else {
            IngestSource::AggregatorPull(snapshot)
        };
        self.run(source, account.id, deadline).await
    }

    async fn after_sync(&self, account: &BankAccount) {
        if !self.sync.detect_transfers {
            return;
        }
        let linked = link_transfers(
            self.store(),
            account.user_id,
            self.today(),
            self.sync.transfer_lookback_days,
            self.sync.transfer_window_days,
        )
        .await;
        if let Err(e) = linked {
            warn!(user = %account.user_id, error = %e, "Transfer detection failed");
        }
    }

    async fn fail_sync(&self, account: AccountId, err: IngestError) -> IngestError {
        warn!(account = %account, error = %err, "Aggregator sync failed");
        let update = SyncUpdate::Failed { message: err.to_string() };
        if let Err(store_err) = self.store().update_account_sync(account, &update).await {
            warn!(account = %account, error = %store_err, "Could not record sync error");
        }
        err
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.sync.timeout_secs)
    }
}

/// An aggregator call bounded by the sync deadline.
async fn fetch<T>(
    deadline: Option<Instant>,
    stage: &'static str,
    call: impl Future<Output = Result<T, AggregatorError>>,
) -> Result<T, IngestError> {
    Ok(within(deadline, stage, call).await??)
}

fn linked_ids(account: &BankAccount) -> Result<(&str, &str), IngestError> {
    match (&account.provider_item_id, &account.provider_account_id) {
        (Some(item), Some(remote)) => Ok((item.as_str(), remote.as_str())),
        _ => Err(IngestError::NotLinked(account.id)),
    }
}
