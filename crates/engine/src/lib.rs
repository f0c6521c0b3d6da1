pub mod aggregator;
pub mod error;
pub mod gate;
pub mod hash;
pub mod ingest;
pub mod recategorize;
pub mod settle;
pub mod sync;
pub mod transfers;

#[cfg(test)]
mod testing;

pub use aggregator::{AggregatorClient, AggregatorError, HttpAggregator, MockAggregator, WebhookEvent};
pub use error::{IngestError, SettleError};
pub use gate::AccountGate;
pub use ingest::{IngestReport, IngestSource, PendingSuggestion, SyncCoordinator};
pub use recategorize::{recategorize_uncategorized, RecategorizeReport};
pub use settle::{settle, SettlementReceipt};
pub use sync::{AccountSyncResult, WebhookOutcome};
pub use transfers::link_transfers;
