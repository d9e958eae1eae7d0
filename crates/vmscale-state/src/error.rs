//! Error types for the vmscale entity store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised by the persistence port. Callers treat every variant as
/// fatal for the operation in progress.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("{table} row {id} not found")]
    NotFound { table: &'static str, id: u64 },

    #[error("policy {policy_id} already maps condition {condition_id}")]
    DuplicateMapRow {
        policy_id: u64,
        condition_id: u64,
    },

    #[error("id sequence for {0} exhausted")]
    SequenceExhausted(&'static str),
}
