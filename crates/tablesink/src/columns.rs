//! Column writes and counter increments produced for one row.
//!
//! A [`ColumnList`] is the output of a [`RecordMapper`](crate::mapper::RecordMapper)
//! for a single record. It holds plain cell writes ([`Column`]) and atomic
//! add-in-place operations ([`Counter`]), both for the same row key.

use bytes::Bytes;

/// A single cell write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub family: Bytes,
    pub qualifier: Bytes,
    pub value: Bytes,
    /// Cell version. Only a positive value pins the write; anything else lets
    /// the store assign the current time.
    pub ts: i64,
}

impl Column {
    /// The version this write should be submitted with, if any.
    pub fn version(&self) -> Option<i64> {
        (self.ts > 0).then_some(self.ts)
    }
}

/// An atomic increment of a numeric cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    pub family: Bytes,
    pub qualifier: Bytes,
    pub delta: i64,
}

/// Writes and increments for one row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnList {
    columns: Vec<Column>,
    counters: Vec<Counter>,
}

impl ColumnList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unversioned cell write.
    pub fn add_column(
        &mut self,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> &mut Self {
        self.add_column_at(family, qualifier, 0, value)
    }

    /// Add a cell write pinned to `ts` (ignored when `ts <= 0`).
    pub fn add_column_at(
        &mut self,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        ts: i64,
        value: impl Into<Bytes>,
    ) -> &mut Self {
        self.columns.push(Column {
            family: family.into(),
            qualifier: qualifier.into(),
            value: value.into(),
            ts,
        });
        self
    }

    /// Add a counter increment.
    pub fn add_counter(
        &mut self,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        delta: i64,
    ) -> &mut Self {
        self.counters.push(Counter {
            family: family.into(),
            qualifier: qualifier.into(),
            delta,
        });
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn counters(&self) -> &[Counter] {
        &self.counters
    }

    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn has_counters(&self) -> bool {
        !self.counters.is_empty()
    }

    /// True when there is nothing to write or increment.
    pub fn is_empty(&self) -> bool {
        !self.has_columns() && !self.has_counters()
    }
}
