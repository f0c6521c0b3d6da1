pub mod db;
pub mod error;
pub mod sqlite;
pub mod store;

pub use db::{create_db, DbPool};
pub use error::StoreError;
pub use sqlite::SqliteStore;
pub use store::{Datastore, ImportLog, NewImportLog, SettlementState};
