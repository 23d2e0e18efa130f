//! Storage client seam.
//!
//! The sink never talks to a store directly. A [`TableClient`] opens a
//! [`Table`] handle from the resolved [`StoreConfig`]; the handle accepts
//! puts and increments for single rows and is closed once at shutdown.
//! Connection pooling, retries and the wire protocol live behind these
//! traits.

use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::mutation::{Increment, Put};

/// An open handle to one table.
///
/// Handles must be usable from several tasks at once; the adapter holds no
/// lock around them.
#[async_trait]
pub trait Table: Send + Sync {
    /// Apply every cell of the put to its row.
    async fn put(&self, put: &Put) -> StoreResult<()>;

    /// Atomically add every delta of the increment to its row.
    async fn increment(&self, increment: &Increment) -> StoreResult<()>;

    /// Release the handle. Called exactly once.
    fn close(&mut self);

    /// Name of the table this handle writes to. Used in lifecycle logs.
    fn name(&self) -> &str;
}

/// Factory for table handles.
#[async_trait]
pub trait TableClient: Send + Sync {
    type Table: Table + 'static;

    /// Open `table` using `config`.
    async fn open_table(&self, config: &StoreConfig, table: &str) -> StoreResult<Self::Table>;
}
