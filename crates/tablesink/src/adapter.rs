//! Write adapter: the sink that turns records into table mutations.
//!
//! ## Per-record flow
//!
//! ```text
//! record ──► mapper.row_key ──► mapper.columns
//!                │                   │
//!             (error)          ┌─────┴──────┐
//!                │             ▼            ▼
//!                │      columns? ──► Put    counters? ──► Increment
//!                │             │ (error)          │ (error)
//!                ▼             ▼                  ▼
//!              fail          fail               fail
//!                                                 │ (ok)
//!                                                 ▼
//!                                                ack
//! ```
//!
//! A record with columns and counters is submitted as one put followed by one
//! increment. If the put fails the increment is skipped and the whole record
//! is failed. Nothing is rolled back: a redelivered record writes its cells
//! again, and applies its counters again if they had already landed.
//!
//! Errors never escape [`WriteAdapter::process`]: they are logged at `warn`
//! and turned into a fail signal. Only [`WriteAdapter::prepare`] returns
//! errors, because an adapter without a table handle cannot process anything.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::collector::{Collector, Outcome};
use crate::config::{AdapterOptions, PipelineConfig, StoreConfig};
use crate::error::{Result, SinkError, StoreError};
use crate::mapper::RecordMapper;
use crate::mutation::{Durability, Increment, Put};
use crate::record::Record;
use crate::store::{Table, TableClient};

/// Step of the per-record flow that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Map,
    Write,
    Increment,
}

/// Snapshot of the adapter's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterStats {
    pub processed: u64,
    pub acked: u64,
    pub failed: u64,
    pub mapping_failures: u64,
    pub write_failures: u64,
    pub increment_failures: u64,
}

#[derive(Default)]
struct StatsCounters {
    processed: AtomicU64,
    acked: AtomicU64,
    failed: AtomicU64,
    mapping_failures: AtomicU64,
    write_failures: AtomicU64,
    increment_failures: AtomicU64,
}

impl StatsCounters {
    fn record_failure(&self, phase: Phase) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        let counter = match phase {
            Phase::Map => &self.mapping_failures,
            Phase::Write => &self.write_failures,
            Phase::Increment => &self.increment_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AdapterStats {
        AdapterStats {
            processed: self.processed.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            mapping_failures: self.mapping_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            increment_failures: self.increment_failures.load(Ordering::Relaxed),
        }
    }
}

/// Sink writing each record to one table.
///
/// The table handle is opened by [`prepare`](Self::prepare) and closed by
/// [`shutdown`](Self::shutdown), or on drop if shutdown never ran.
pub struct WriteAdapter<T: Table> {
    table: Option<T>,
    table_name: String,
    store_config: StoreConfig,
    mapper: Arc<dyn RecordMapper>,
    durability: Durability,
    collector: Arc<dyn Collector>,
    stats: StatsCounters,
}

impl<T: Table + 'static> WriteAdapter<T> {
    /// Resolve the store configuration and open the table.
    ///
    /// Fails with [`SinkError::Config`] on invalid properties and with
    /// [`SinkError::Init`] when the table cannot be opened.
    pub async fn prepare<C>(
        options: AdapterOptions,
        pipeline: &PipelineConfig,
        client: &C,
        collector: impl Collector + 'static,
    ) -> Result<Self>
    where
        C: TableClient<Table = T>,
    {
        let store_config = StoreConfig::resolve(options.properties(), pipeline)?;
        tracing::info!(
            table = %options.table_name(),
            cluster_distributed = store_config.cluster_distributed,
            root_location = %store_config.root_location,
            coordinator_quorum = %store_config.coordinator_quorum,
            durability = %options.durability(),
            "preparing write adapter"
        );

        let table = client
            .open_table(&store_config, options.table_name())
            .await
            .map_err(|source| {
                tracing::error!(table = %options.table_name(), error = %source, "failed to open table");
                SinkError::Init {
                    table: options.table_name().to_string(),
                    source,
                }
            })?;
        tracing::info!(table = %table.name(), "table opened");

        Ok(Self {
            table: Some(table),
            table_name: options.table_name().to_string(),
            store_config,
            mapper: options.mapper().clone(),
            durability: options.durability(),
            collector: Arc::new(collector),
            stats: StatsCounters::default(),
        })
    }

    /// Map, submit and signal one record.
    ///
    /// Exactly one of `ack`/`fail` is called on the collector before this
    /// returns, and the returned outcome matches it.
    pub async fn process(&self, record: &Record) -> Outcome {
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        match self.apply(record).await {
            Ok(()) => {
                self.stats.acked.fetch_add(1, Ordering::Relaxed);
                self.collector.ack(record);
                Outcome::Acked
            }
            Err((phase, e)) => {
                let message = match phase {
                    Phase::Map => "Failing record. Error mapping record.",
                    Phase::Write => "Failing record. Error writing column.",
                    Phase::Increment => "Failing record. Error incrementing counter.",
                };
                tracing::warn!(
                    table = %self.table_name,
                    record = %record.id(),
                    kind = e.kind(),
                    error = %e,
                    "{}",
                    message
                );
                self.stats.record_failure(phase);
                self.collector.fail(record);
                Outcome::Failed
            }
        }
    }

    async fn apply(&self, record: &Record) -> std::result::Result<(), (Phase, SinkError)> {
        let row = self.mapper.row_key(record).map_err(|e| (Phase::Map, e))?;
        let cols = self.mapper.columns(record).map_err(|e| (Phase::Map, e))?;

        if cols.is_empty() {
            tracing::trace!(record = %record.id(), "nothing to write");
            return Ok(());
        }

        let table = self
            .table
            .as_ref()
            .ok_or((Phase::Write, SinkError::Store(StoreError::Closed)))?;

        if cols.has_columns() {
            let put = Put::from_columns(row.clone(), cols.columns(), self.durability);
            table
                .put(&put)
                .await
                .map_err(|e| (Phase::Write, SinkError::Store(e)))?;
        }

        if cols.has_counters() {
            let increment = Increment::from_counters(row, cols.counters(), self.durability);
            table
                .increment(&increment)
                .await
                .map_err(|e| (Phase::Increment, SinkError::Store(e)))?;
        }

        Ok(())
    }

    /// Row key the mapper assigns to `record`, without touching the store.
    pub fn row_key(&self, record: &Record) -> Result<Bytes> {
        self.mapper.row_key(record)
    }

    /// Output fields emitted downstream. Always empty: this is a terminal sink.
    pub fn declare_output_fields(&self) -> Vec<String> {
        Vec::new()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn store_config(&self) -> &StoreConfig {
        &self.store_config
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    pub fn stats(&self) -> AdapterStats {
        self.stats.snapshot()
    }

    /// Close the table handle and return the final counters.
    pub fn shutdown(mut self) -> AdapterStats {
        if let Some(mut table) = self.table.take() {
            tracing::debug!(table = %table.name(), "closing table");
            table.close();
        }
        let stats = self.stats.snapshot();
        tracing::info!(
            table = %self.table_name,
            processed = stats.processed,
            acked = stats.acked,
            failed = stats.failed,
            "write adapter shut down"
        );
        stats
    }
}

impl<T: Table> Drop for WriteAdapter<T> {
    fn drop(&mut self) {
        if let Some(mut table) = self.table.take() {
            tracing::debug!(table = %table.name(), "closing table on drop");
            table.close();
        }
    }
}
