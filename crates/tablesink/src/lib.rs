//! tablesink
//!
//! A write sink that persists pipeline records into column-family tables
//! (row key, column family, qualifier, versioned cells, atomic counters) with
//! an at-least-once ack/fail contract back to the pipeline.
//!
//! ## Architecture
//!
//! - **Mapper**: [`RecordMapper`] turns a [`Record`] into a row key and a
//!   [`ColumnList`]; [`FieldMapper`] is the stock field-driven mapper.
//! - **Adapter**: [`WriteAdapter`] opens the table, submits one [`Put`] and
//!   one [`Increment`] per record and signals the [`Collector`].
//! - **Store**: [`TableClient`] / [`Table`] are the seam to the storage
//!   client; [`MemoryTableClient`] is the in-process implementation.
//! - **Config**: [`StoreConfig`] layered from defaults, properties and the
//!   pipeline override; [`AdapterOptions`] fixed per adapter.
//! - **Runtime**: [`SinkRuntime`] drives an adapter from a record channel.
//! - **Loader**: [`load_lines`] feeds newline-delimited JSON through an
//!   adapter; backs the `tablesink-load` binary.

pub mod adapter;
pub mod collector;
pub mod columns;
pub mod config;
pub mod error;
pub mod loader;
pub mod mapper;
pub mod memory;
pub mod mutation;
pub mod record;
pub mod runtime;
pub mod store;

pub use adapter::{AdapterStats, WriteAdapter};
pub use collector::{ChannelCollector, Collector, MemoryCollector, Outcome};
pub use columns::{Column, ColumnList, Counter};
pub use config::{AdapterOptions, AdapterOptionsBuilder, PipelineConfig, StoreConfig};
pub use error::{Result, SinkError, StoreError, StoreResult};
pub use loader::{load_lines, LoadConfig, LoadSummary};
pub use mapper::{FieldMapper, RecordMapper};
pub use memory::{MemoryTable, MemoryTableClient};
pub use mutation::{Cell, CounterDelta, Durability, Increment, Put};
pub use record::{DeliveryId, Record};
pub use runtime::{SinkRuntime, SinkState};
pub use store::{Table, TableClient};
