pub mod account;
pub mod category;
pub mod config;
pub mod dda;
pub mod money;
pub mod period;
pub mod reconciliation;
pub mod statement;
pub mod transaction;
pub mod validate;

pub use account::{AccountId, BankAccount, SyncUpdate, UserId};
pub use category::{
    CategorizationMode, CategorizedRecord, Category, CategoryId, Confidence, UserRule,
};
pub use config::{ConfigError, EngineConfig, HeaderMode};
pub use dda::{DdaInstrument, DdaStatus, NewDdaInstrument};
pub use money::Money;
pub use period::DateRange;
pub use reconciliation::{
    RecordKind, ReconciliationEvent, ReconciliationStatus, ResolvedSettlement, Settlement,
    SettlementBatch, SettlementError, SettlementItem, TransitionError,
};
pub use statement::{RawStatementFile, StatementFormat};
pub use transaction::{
    Direction, NewTransaction, ParsedRecord, SourceTag, StoredTransaction, TransactionId,
    ValidRecord,
};
pub use validate::{validate, InvalidReason, ValidationOutcome};
