use chrono::{Days, NaiveDate};
use tracing::info;

use saldo_core::UserId;
use saldo_import::pair_transfers;
use saldo_storage::{Datastore, StoreError};

/// Looks back `lookback_days` from `today` for unlinked movements that
/// form a transfer between two of the user's accounts and links each pair
/// both ways. Returns the number of pairs linked.
pub async fn link_transfers<S: Datastore>(
    store: &S,
    user: UserId,
    today: NaiveDate,
    lookback_days: u64,
    window_days: u64,
) -> Result<usize, StoreError> {
    let since = today.checked_sub_days(Days::new(lookback_days)).unwrap_or(NaiveDate::MIN);
    let candidates = store.unlinked_transactions_since(user, since).await?;
    let pairs = pair_transfers(&candidates, window_days);
    for (a, b) in &pairs {
        store.link_transfer(*a, *b).await?;
    }
    if !pairs.is_empty() {
        info!(user = %user, pairs = pairs.len(), "Linked internal transfers");
    }
    Ok(pairs.len())
}
