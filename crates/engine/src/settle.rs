use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use saldo_core::reconciliation::check_transitions;
use saldo_core::{RecordKind, ReconciliationStatus, Settlement, SettlementBatch, UserId};
use saldo_storage::Datastore;

use crate::error::SettleError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementReceipt {
    pub settlement: Settlement,
    pub transactions: usize,
    pub ddas: usize,
}

/// Executes a "baixa": settles every record of `batch` or none of them.
///
/// All policy checks (required fields, one settlement account, ownership,
/// nothing already settled) run before the first write.
pub async fn settle<S: Datastore>(
    store: &S,
    user: UserId,
    batch: &SettlementBatch,
) -> Result<SettlementReceipt, SettleError> {
    let resolved = batch.resolve().inspect_err(|e| {
        warn!(user = %user, error = %e, "Settlement batch rejected");
    })?;

    let account = resolved.settlement.account_id;
    match store.account(account).await? {
        Some(a) if a.user_id == user => {}
        _ => {
            warn!(user = %user, account = %account, "Settlement account not found");
            return Err(SettleError::UnknownSettlementAccount(account));
        }
    }

    let states: HashMap<(RecordKind, i64), ReconciliationStatus> = store
        .settlement_states(user, &resolved.transaction_ids, &resolved.dda_ids)
        .await?
        .into_iter()
        .map(|s| ((s.kind, s.id), s.status))
        .collect();

    let named = resolved
        .transaction_ids
        .iter()
        .map(|id| (*id, RecordKind::Transaction))
        .chain(resolved.dda_ids.iter().map(|id| (*id, RecordKind::Dda)));
    check_transitions(
        &resolved,
        named.map(|(id, kind)| (id, kind, states.get(&(kind, id)))),
    )
    .inspect_err(|e| warn!(user = %user, error = %e, "Settlement batch rejected"))?;

    store.apply_settlement(&resolved).await?;

    info!(
        user = %user,
        account = %account,
        date = %resolved.settlement.date,
        transactions = resolved.transaction_ids.len(),
        ddas = resolved.dda_ids.len(),
        "Settlement applied"
    );
    Ok(SettlementReceipt {
        settlement: resolved.settlement,
        transactions: resolved.transaction_ids.len(),
        ddas: resolved.dda_ids.len(),
    })
}
