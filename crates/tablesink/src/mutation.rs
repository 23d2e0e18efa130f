//! Row mutations submitted to the store.
//!
//! A record produces at most one [`Put`] and at most one [`Increment`], both
//! for the same row and both carrying the adapter's [`Durability`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::columns::{Column, Counter};

/// Whether mutations go through the write-ahead log before the store
/// acknowledges them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Journal to the WAL first.
    #[default]
    Wal,
    /// Skip the WAL. Faster, loses unflushed edits if a server dies.
    SkipWal,
}

impl Durability {
    pub fn from_wal_flag(write_to_wal: bool) -> Self {
        if write_to_wal {
            Durability::Wal
        } else {
            Durability::SkipWal
        }
    }

    pub fn writes_to_wal(self) -> bool {
        self == Durability::Wal
    }
}

impl std::fmt::Display for Durability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Durability::Wal => write!(f, "wal"),
            Durability::SkipWal => write!(f, "skip_wal"),
        }
    }
}

/// One cell of a [`Put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub family: Bytes,
    pub qualifier: Bytes,
    pub value: Bytes,
    /// `None` lets the store assign the current time.
    pub version: Option<i64>,
}

impl From<&Column> for Cell {
    fn from(col: &Column) -> Self {
        Self {
            family: col.family.clone(),
            qualifier: col.qualifier.clone(),
            value: col.value.clone(),
            version: col.version(),
        }
    }
}

/// Cell writes for a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub row: Bytes,
    pub cells: Vec<Cell>,
    pub durability: Durability,
}

impl Put {
    /// Build a put holding every column, in order.
    pub fn from_columns(row: Bytes, columns: &[Column], durability: Durability) -> Self {
        Self {
            row,
            cells: columns.iter().map(Cell::from).collect(),
            durability,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// One column of an [`Increment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDelta {
    pub family: Bytes,
    pub qualifier: Bytes,
    pub delta: i64,
}

impl From<&Counter> for CounterDelta {
    fn from(counter: &Counter) -> Self {
        Self {
            family: counter.family.clone(),
            qualifier: counter.qualifier.clone(),
            delta: counter.delta,
        }
    }
}

/// Counter increments for a single row, applied atomically by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub row: Bytes,
    pub deltas: Vec<CounterDelta>,
    pub durability: Durability,
}

impl Increment {
    /// Build an increment holding every counter, in order.
    pub fn from_counters(row: Bytes, counters: &[Counter], durability: Durability) -> Self {
        Self {
            row,
            deltas: counters.iter().map(CounterDelta::from).collect(),
            durability,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}
