use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Corrupt {table} row {id}: {detail}")]
    Corrupt {
        table: &'static str,
        id: i64,
        detail: String,
    },
    /// A row changed between the settlement check and the update.
    #[error("Settlement conflict: {0}")]
    Conflict(String),
}
