//! Ack/fail signalling back to the pipeline.
//!
//! Every record that reaches [`WriteAdapter::process`](crate::adapter::WriteAdapter::process)
//! produces exactly one call on the [`Collector`]: `ack` when all of its
//! mutations were applied, `fail` otherwise. A failed record is expected to
//! be redelivered by the pipeline.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::record::{DeliveryId, Record};

/// Final status of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Acked,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Acked => write!(f, "ACKED"),
            Outcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// Receiver of per-record ack/fail signals.
pub trait Collector: Send + Sync {
    fn ack(&self, record: &Record);

    fn fail(&self, record: &Record);
}

/// Forwards signals over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelCollector {
    tx: mpsc::UnboundedSender<(DeliveryId, Outcome)>,
}

impl ChannelCollector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(DeliveryId, Outcome)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, record: &Record, outcome: Outcome) {
        if self.tx.send((record.id(), outcome)).is_err() {
            tracing::warn!(record = %record.id(), %outcome, "ack channel closed, signal dropped");
        }
    }
}

impl Collector for ChannelCollector {
    fn ack(&self, record: &Record) {
        self.send(record, Outcome::Acked);
    }

    fn fail(&self, record: &Record) {
        self.send(record, Outcome::Failed);
    }
}

/// Keeps every signal in memory, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct MemoryCollector {
    signals: Arc<Mutex<Vec<(DeliveryId, Outcome)>>>,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: &Record, outcome: Outcome) {
        self.signals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((record.id(), outcome));
    }

    /// All signals so far.
    pub fn signals(&self) -> Vec<(DeliveryId, Outcome)> {
        self.signals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Signals received for one record.
    pub fn signals_for(&self, id: DeliveryId) -> Vec<Outcome> {
        self.signals()
            .into_iter()
            .filter(|(rid, _)| *rid == id)
            .map(|(_, o)| o)
            .collect()
    }

    pub fn acked(&self) -> usize {
        self.count(Outcome::Acked)
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::Failed)
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.signals().iter().filter(|(_, o)| *o == outcome).count()
    }
}

impl Collector for MemoryCollector {
    fn ack(&self, record: &Record) {
        self.push(record, Outcome::Acked);
    }

    fn fail(&self, record: &Record) {
        self.push(record, Outcome::Failed);
    }
}
