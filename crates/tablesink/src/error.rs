//! Error types for the table sink.
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`] is what a storage client reports when a put, increment or
//!   open fails. It is produced by [`Table`](crate::store::Table) and
//!   [`TableClient`](crate::store::TableClient) implementations.
//! - [`SinkError`] is the adapter-level taxonomy. Per-record variants
//!   (`Mapping`, `Store`) are turned into a fail signal at the record boundary;
//!   startup variants (`Init`, `Config`) propagate out of `prepare`.

use std::time::Duration;

use thiserror::Error;

/// Errors reported by a storage client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport or I/O failure talking to the store.
    #[error("I/O error: {0}")]
    Io(String),

    /// The store did not answer in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Some actions of a multi-action request failed after the client gave up
    /// retrying them.
    #[error("{failed} action(s) failed after retries, first cause: {first_cause}")]
    RetriesExhausted { failed: usize, first_cause: String },

    /// The requested table does not exist.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// The handle was used after it was closed.
    #[error("Table handle is closed")]
    Closed,

    /// The store refused a malformed mutation.
    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),
}

impl StoreError {
    /// Short, stable name of the error kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Io(_) => "io",
            StoreError::Timeout(_) => "timeout",
            StoreError::RetriesExhausted { .. } => "retries_exhausted",
            StoreError::TableNotFound(_) => "table_not_found",
            StoreError::Closed => "closed",
            StoreError::InvalidMutation(_) => "invalid_mutation",
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Errors raised by the sink adapter.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The record cannot be translated into a row key or mutations.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Submitting a put or increment to the store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The table handle could not be opened at startup.
    #[error("Failed to open table '{table}': {source}")]
    Init { table: String, source: StoreError },

    /// Invalid adapter options or store properties.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error in the sink runtime.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Local I/O error (config files, record input).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// Short, stable name of the error kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            SinkError::Mapping(_) => "mapping",
            SinkError::Store(e) => e.kind(),
            SinkError::Init { .. } => "init",
            SinkError::Config(_) => "config",
            SinkError::Runtime(_) => "runtime",
            SinkError::Io(_) => "io",
        }
    }
}

/// Result type alias for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Result type alias for storage client operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
