use serde::Serialize;
use tracing::info;

use saldo_core::{CategorizationMode, Confidence, UserId};
use saldo_import::{Categorizer, KeywordDictionary};
use saldo_storage::{Datastore, StoreError};

use crate::ingest::{PendingSuggestion, SyncCoordinator};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecategorizeReport {
    pub examined: usize,
    pub updated: u64,
    pub pending_confirmation: Vec<PendingSuggestion>,
}

/// Runs the categorization cascade over the user's uncategorised
/// transactions and applies every eligible match in one bulk update.
/// Each row keeps the confidence of the tier that matched it.
pub async fn recategorize_uncategorized<S: Datastore>(
    store: &S,
    user: UserId,
    mode: CategorizationMode,
    keywords: &KeywordDictionary,
) -> Result<RecategorizeReport, StoreError> {
    let categorizer = Categorizer::new(
        store.categories(user).await?,
        store.rules(user).await?,
        keywords.clone(),
    );
    let pending = store.uncategorized_transactions(user).await?;

    let mut report = RecategorizeReport {
        examined: pending.len(),
        ..RecategorizeReport::default()
    };
    let mut assignments = Vec::new();
    for tx in &pending {
        let suggestion = categorizer.suggest(&tx.description, None);
        match suggestion.category_id {
            Some(category) if mode.applies(suggestion.confidence) => {
                assignments.push((tx.id, category, suggestion.confidence));
            }
            _ if suggestion.confidence == Confidence::Keyword => {
                if let Some(name) = suggestion.name {
                    report.pending_confirmation.push(PendingSuggestion {
                        transaction_id: tx.id,
                        category_id: suggestion.category_id,
                        category_name: name,
                    });
                }
            }
            _ => {}
        }
    }

    if !assignments.is_empty() {
        report.updated = store.assign_categories(&assignments).await?;
    }
    info!(
        user = %user,
        examined = report.examined,
        updated = report.updated,
        pending = report.pending_confirmation.len(),
        "Bulk categorization complete"
    );
    Ok(report)
}

impl<S: Datastore> SyncCoordinator<S> {
    /// Bulk categorization with the coordinator's mode and dictionary.
    pub async fn recategorize(&self, user: UserId) -> Result<RecategorizeReport, StoreError> {
        recategorize_uncategorized(self.store(), user, self.mode, &self.keywords).await
    }
}
