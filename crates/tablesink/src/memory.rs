//! In-process storage client.
//!
//! [`MemoryTableClient`] keeps tables in memory with versioned cells and
//! counters. It records every put and increment it receives, counts handle
//! closes, and can be told to fail upcoming calls, which makes it the
//! workhorse for tests and for dry runs of the loader binary.
//!
//! Clones share state, so a test can keep one clone for inspection while the
//! adapter owns the handle.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::mutation::{Increment, Put};
use crate::store::{Table, TableClient};

type ColumnKey = (Bytes, Bytes);

#[derive(Default)]
struct TableData {
    /// row -> (family, qualifier) -> version -> value
    cells: BTreeMap<Bytes, BTreeMap<ColumnKey, BTreeMap<i64, Bytes>>>,
    /// row -> (family, qualifier) -> total
    counters: BTreeMap<Bytes, BTreeMap<ColumnKey, i64>>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, TableData>,
    open_failures: VecDeque<StoreError>,
    put_failures: VecDeque<StoreError>,
    increment_failures: VecDeque<StoreError>,
    put_log: Vec<Put>,
    increment_log: Vec<Increment>,
    opened: Vec<StoreConfig>,
    closes: usize,
    wal_edits: u64,
    clock: i64,
}

impl Inner {
    /// Wall-clock millis, forced to move forward on every call.
    fn next_timestamp(&mut self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        self.clock = now.max(self.clock + 1);
        self.clock
    }
}

/// A stored cell, flattened for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCell {
    pub row: Bytes,
    pub family: Bytes,
    pub qualifier: Bytes,
    pub version: i64,
    pub value: Bytes,
}

/// A stored counter, flattened for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCounter {
    pub row: Bytes,
    pub family: Bytes,
    pub qualifier: Bytes,
    pub value: i64,
}

/// In-memory [`TableClient`].
#[derive(Clone, Default)]
pub struct MemoryTableClient {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTableClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client that already holds the given empty tables.
    pub fn with_tables<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for name in names {
            client.create_table(name);
        }
        client
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the state from later asserts.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create an empty table. No-op if it already exists.
    pub fn create_table(&self, name: impl Into<String>) {
        self.lock().tables.entry(name.into()).or_default();
    }

    /// Make the next `open_table` call fail with `err`.
    pub fn fail_next_open(&self, err: StoreError) {
        self.lock().open_failures.push_back(err);
    }

    /// Make the next `put` fail with `err`. Failures queue up in order.
    pub fn fail_next_put(&self, err: StoreError) {
        self.lock().put_failures.push_back(err);
    }

    /// Make the next `increment` fail with `err`. Failures queue up in order.
    pub fn fail_next_increment(&self, err: StoreError) {
        self.lock().increment_failures.push_back(err);
    }

    /// Every put received, including the ones that were failed on purpose.
    pub fn put_log(&self) -> Vec<Put> {
        self.lock().put_log.clone()
    }

    /// Every increment received, including the ones that were failed on purpose.
    pub fn increment_log(&self) -> Vec<Increment> {
        self.lock().increment_log.clone()
    }

    /// Configurations of every successful open, in order.
    pub fn opened_with(&self) -> Vec<StoreConfig> {
        self.lock().opened.clone()
    }

    /// Puts and increments applied through the write-ahead log.
    pub fn wal_edits(&self) -> u64 {
        self.lock().wal_edits
    }

    /// Number of table handles closed so far.
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Latest version of a cell.
    pub fn cell(&self, table: &str, row: &[u8], family: &[u8], qualifier: &[u8]) -> Option<Bytes> {
        self.cell_versions(table, row, family, qualifier)
            .into_iter()
            .next_back()
            .map(|(_, v)| v)
    }

    /// Every version of a cell, oldest first.
    pub fn cell_versions(
        &self,
        table: &str,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
    ) -> Vec<(i64, Bytes)> {
        let inner = self.lock();
        let key = (Bytes::copy_from_slice(family), Bytes::copy_from_slice(qualifier));
        inner
            .tables
            .get(table)
            .and_then(|t| t.cells.get(row))
            .and_then(|cols| cols.get(&key))
            .map(|versions| versions.iter().map(|(ts, v)| (*ts, v.clone())).collect())
            .unwrap_or_default()
    }

    /// Current value of a counter.
    pub fn counter(&self, table: &str, row: &[u8], family: &[u8], qualifier: &[u8]) -> Option<i64> {
        let inner = self.lock();
        let key = (Bytes::copy_from_slice(family), Bytes::copy_from_slice(qualifier));
        inner
            .tables
            .get(table)
            .and_then(|t| t.counters.get(row))
            .and_then(|cols| cols.get(&key))
            .copied()
    }

    /// All cell versions of a table, ordered by row, column, version.
    pub fn cells(&self, table: &str) -> Vec<StoredCell> {
        let inner = self.lock();
        let Some(data) = inner.tables.get(table) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (row, cols) in &data.cells {
            for ((family, qualifier), versions) in cols {
                for (version, value) in versions {
                    out.push(StoredCell {
                        row: row.clone(),
                        family: family.clone(),
                        qualifier: qualifier.clone(),
                        version: *version,
                        value: value.clone(),
                    });
                }
            }
        }
        out
    }

    /// All counters of a table, ordered by row and column.
    pub fn counters(&self, table: &str) -> Vec<StoredCounter> {
        let inner = self.lock();
        let Some(data) = inner.tables.get(table) else {
            return Vec::new();
        };
        data.counters
            .iter()
            .flat_map(|(row, cols)| {
                cols.iter().map(move |((family, qualifier), value)| StoredCounter {
                    row: row.clone(),
                    family: family.clone(),
                    qualifier: qualifier.clone(),
                    value: *value,
                })
            })
            .collect()
    }

    /// Distinct rows holding at least one cell or counter.
    pub fn row_count(&self, table: &str) -> usize {
        let inner = self.lock();
        inner
            .tables
            .get(table)
            .map(|t| {
                t.cells
                    .keys()
                    .chain(t.counters.keys())
                    .collect::<HashSet<_>>()
                    .len()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl TableClient for MemoryTableClient {
    type Table = MemoryTable;

    async fn open_table(&self, config: &StoreConfig, table: &str) -> StoreResult<MemoryTable> {
        let mut inner = self.lock();
        if let Some(err) = inner.open_failures.pop_front() {
            return Err(err);
        }
        if !inner.tables.contains_key(table) {
            return Err(StoreError::TableNotFound(table.to_string()));
        }
        inner.opened.push(config.clone());
        drop(inner);

        tracing::debug!(
            table = %table,
            properties = ?config.to_config_map(),
            "opened in-memory table"
        );
        Ok(MemoryTable {
            name: table.to_string(),
            inner: self.inner.clone(),
            closed: false,
        })
    }
}

/// Handle to one in-memory table.
pub struct MemoryTable {
    name: String,
    inner: Arc<Mutex<Inner>>,
    closed: bool,
}

impl MemoryTable {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Table for MemoryTable {
    async fn put(&self, put: &Put) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        let mut inner = self.lock();
        inner.put_log.push(put.clone());
        if let Some(err) = inner.put_failures.pop_front() {
            return Err(err);
        }
        if put.is_empty() {
            return Err(StoreError::InvalidMutation("put has no cells".to_string()));
        }

        let now = inner.next_timestamp();
        let data = inner
            .tables
            .get_mut(&self.name)
            .ok_or_else(|| StoreError::TableNotFound(self.name.clone()))?;
        let row = data.cells.entry(put.row.clone()).or_default();
        for cell in &put.cells {
            row.entry((cell.family.clone(), cell.qualifier.clone()))
                .or_default()
                .insert(cell.version.unwrap_or(now), cell.value.clone());
        }
        if put.durability.writes_to_wal() {
            inner.wal_edits += 1;
        }
        Ok(())
    }

    async fn increment(&self, increment: &Increment) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        let mut inner = self.lock();
        inner.increment_log.push(increment.clone());
        if let Some(err) = inner.increment_failures.pop_front() {
            return Err(err);
        }
        if increment.is_empty() {
            return Err(StoreError::InvalidMutation(
                "increment has no columns".to_string(),
            ));
        }

        let data = inner
            .tables
            .get_mut(&self.name)
            .ok_or_else(|| StoreError::TableNotFound(self.name.clone()))?;
        let row = data.counters.entry(increment.row.clone()).or_default();
        for delta in &increment.deltas {
            let total = row
                .entry((delta.family.clone(), delta.qualifier.clone()))
                .or_insert(0);
            *total = total.wrapping_add(delta.delta);
        }
        if increment.durability.writes_to_wal() {
            inner.wal_edits += 1;
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.lock().closes += 1;
        tracing::debug!(table = %self.name, "closed in-memory table");
    }

    fn name(&self) -> &str {
        &self.name
    }
}
