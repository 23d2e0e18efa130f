//! Runtime driving one write adapter from a record channel.
//!
//! `SinkRuntime` moves a [`WriteAdapter`] onto a background tokio task that
//! pulls records from an `mpsc` channel and processes them one at a time,
//! with pause, resume and stop control signals. All access to the adapter
//! goes through that single task, so the table handle is never used
//! concurrently.
//!
//! The task ends when it receives `Stop`, when the runtime handle is dropped,
//! or when every record sender is gone and the queue is drained. The adapter
//! is shut down on exit and its final counters are returned.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::adapter::{AdapterStats, WriteAdapter};
use crate::error::{Result, SinkError};
use crate::record::Record;
use crate::store::Table;

/// Control signals sent from the runtime to the adapter task.
#[derive(Debug)]
enum ControlSignal {
    Pause,
    Resume,
    Stop,
}

/// State of the adapter task as seen by the runtime handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Running,
    Paused,
}

impl std::fmt::Display for SinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkState::Running => write!(f, "RUNNING"),
            SinkState::Paused => write!(f, "PAUSED"),
        }
    }
}

/// Handle to a running adapter task.
///
/// # Example
///
/// ```ignore
/// let (tx, rx) = tokio::sync::mpsc::channel(1024);
/// let mut runtime = SinkRuntime::spawn(adapter, rx);
/// tx.send(record).await?;
/// runtime.pause()?;
/// runtime.resume()?;
/// let stats = runtime.stop().await?;
/// ```
pub struct SinkRuntime {
    name: String,
    join_handle: JoinHandle<AdapterStats>,
    control_tx: mpsc::Sender<ControlSignal>,
    state: SinkState,
}

impl SinkRuntime {
    /// Start processing records from `records` on a background task.
    pub fn spawn<T>(adapter: WriteAdapter<T>, mut records: mpsc::Receiver<Record>) -> Self
    where
        T: Table + 'static,
    {
        let name = adapter.table_name().to_string();
        let (control_tx, mut control_rx) = mpsc::channel::<ControlSignal>(16);
        let task_name = name.clone();

        let join_handle = tokio::spawn(async move {
            let mut paused = false;

            loop {
                if paused {
                    match control_rx.recv().await {
                        Some(ControlSignal::Resume) => {
                            tracing::info!(table = %task_name, "resuming sink");
                            paused = false;
                        }
                        Some(ControlSignal::Pause) => {}
                        Some(ControlSignal::Stop) | None => break,
                    }
                    continue;
                }

                tokio::select! {
                    biased;

                    signal = control_rx.recv() => match signal {
                        Some(ControlSignal::Pause) => {
                            tracing::info!(table = %task_name, "pausing sink");
                            paused = true;
                        }
                        Some(ControlSignal::Resume) => {}
                        Some(ControlSignal::Stop) => {
                            tracing::info!(table = %task_name, "stopping sink");
                            break;
                        }
                        None => {
                            tracing::warn!(table = %task_name, "control channel closed, stopping");
                            break;
                        }
                    },

                    record = records.recv() => match record {
                        Some(record) => {
                            adapter.process(&record).await;
                        }
                        None => {
                            tracing::info!(table = %task_name, "record channel closed, stopping");
                            break;
                        }
                    },
                }
            }

            adapter.shutdown()
        });

        Self {
            name,
            join_handle,
            control_tx,
            state: SinkState::Running,
        }
    }

    /// Stop pulling records until [`resume`](Self::resume) is called.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != SinkState::Running {
            return Err(SinkError::Runtime(format!(
                "sink '{}' is not running (state: {})",
                self.name, self.state
            )));
        }

        self.control_tx
            .try_send(ControlSignal::Pause)
            .map_err(|e| SinkError::Runtime(format!("failed to send pause: {}", e)))?;

        self.state = SinkState::Paused;
        Ok(())
    }

    /// Continue after a [`pause`](Self::pause).
    pub fn resume(&mut self) -> Result<()> {
        if self.state != SinkState::Paused {
            return Err(SinkError::Runtime(format!(
                "sink '{}' is not paused (state: {})",
                self.name, self.state
            )));
        }

        self.control_tx
            .try_send(ControlSignal::Resume)
            .map_err(|e| SinkError::Runtime(format!("failed to send resume: {}", e)))?;

        self.state = SinkState::Running;
        Ok(())
    }

    /// Stop right away, leaving queued records unprocessed, and wait for the
    /// adapter to shut down.
    pub async fn stop(self) -> Result<AdapterStats> {
        // A send error means the task already exited; the join below still
        // yields its stats.
        let _ = self.control_tx.send(ControlSignal::Stop).await;
        self.join().await
    }

    /// Wait for the task to drain its queue after every record sender has
    /// been dropped. A paused task is resumed first.
    pub async fn finish(self) -> Result<AdapterStats> {
        let Self {
            name,
            join_handle,
            control_tx,
            state,
        } = self;
        if state == SinkState::Paused {
            tracing::info!(table = %name, "resuming paused sink to drain queue");
            // A send error means the task already exited.
            let _ = control_tx.send(ControlSignal::Resume).await;
        }
        let stats = join_handle
            .await
            .map_err(|e| SinkError::Runtime(format!("sink task failed: {}", e)))?;
        drop(control_tx);
        Ok(stats)
    }

    async fn join(self) -> Result<AdapterStats> {
        self.join_handle
            .await
            .map_err(|e| SinkError::Runtime(format!("sink task failed: {}", e)))
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
