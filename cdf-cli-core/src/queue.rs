//! # queue: batching upload queue with background flushing
//!
//! [`UploadQueue`] buffers [`FileUnit`]s from a producer and hands them to a
//! [`FilesBackend`] in batches. A batch is flushed when the buffer reaches
//! `max_batch_size`, when the periodic timer fires, or when the queue stops.
//!
//! ## Lifecycle
//! `Created --start()--> Running --stop()--> Stopped`. `put` is only accepted
//! while running; `stop` flushes whatever is left and waits for it.
//!
//! ## Concurrency
//! - The buffer sits behind a `std::sync::Mutex` that is held only while
//!   units are pushed or drained, never across a backend call.
//! - A `tokio::sync::Mutex` gate keeps at most one flush in flight. A flush
//!   takes the gate before draining, so batches reach the backend in
//!   submission order.
//! - The timer task is cancelled through a `CancellationToken`; a flush that
//!   already started always runs to completion.
//!
//! ## Failures
//! A failed batch is reported to `on_error` and dropped. Nothing is retried or
//! re-enqueued, and later `put` calls are unaffected.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::contract::{FileMetadata, FileUnit, FilesBackend};
use crate::error::{CdfError, Result};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_UPLOAD_INTERVAL: Duration = Duration::from_secs(5);

pub type BatchCallback = Arc<dyn Fn(&[FileMetadata]) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&CdfError) + Send + Sync>;

/// Flush thresholds and completion callbacks for an [`UploadQueue`].
#[derive(Clone)]
pub struct QueueConfig {
    pub max_batch_size: usize,
    pub max_upload_interval: Duration,
    pub on_batch_uploaded: Option<BatchCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_upload_interval: DEFAULT_MAX_UPLOAD_INTERVAL,
            on_batch_uploaded: None,
            on_error: None,
        }
    }
}

impl fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConfig")
            .field("max_batch_size", &self.max_batch_size)
            .field("max_upload_interval", &self.max_upload_interval)
            .field("on_batch_uploaded", &self.on_batch_uploaded.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl QueueConfig {
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_max_upload_interval(mut self, interval: Duration) -> Self {
        self.max_upload_interval = interval;
        self
    }

    pub fn with_batch_callback(
        mut self,
        callback: impl Fn(&[FileMetadata]) + Send + Sync + 'static,
    ) -> Self {
        self.on_batch_uploaded = Some(Arc::new(callback));
        self
    }

    pub fn with_error_callback(mut self, callback: impl Fn(&CdfError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(CdfError::Validation(
                "max batch size must be at least 1".to_string(),
            ));
        }
        if self.max_upload_interval.is_zero() {
            return Err(CdfError::Validation(
                "max upload interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Created,
    Running,
    Stopped,
}

/// State shared between the producer side and the timer task.
struct Shared<B> {
    backend: Arc<B>,
    config: QueueConfig,
    buffer: Mutex<VecDeque<FileUnit>>,
    flush_gate: tokio::sync::Mutex<()>,
}

impl<B: FilesBackend> Shared<B> {
    fn buffer(&self) -> MutexGuard<'_, VecDeque<FileUnit>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flush one batch of at most `max_batch_size` units. Returns its size.
    async fn flush_once(&self) -> usize {
        let _gate = self.flush_gate.lock().await;
        let batch: Vec<FileUnit> = {
            let mut buffer = self.buffer();
            let take = buffer.len().min(self.config.max_batch_size);
            let batch = buffer.drain(..take).collect();
            batch
        };
        if batch.is_empty() {
            return 0;
        }

        let size = batch.len();
        debug!(batch_size = size, "Flushing upload batch");
        match self.backend.upload_files(batch).await {
            Ok(outcome) => {
                info!(
                    uploaded = outcome.uploaded.len(),
                    failed = outcome.failed.len(),
                    "Upload batch completed"
                );
                if !outcome.uploaded.is_empty() {
                    if let Some(callback) = &self.config.on_batch_uploaded {
                        callback(&outcome.uploaded);
                    }
                }
                for failed in outcome.failed {
                    self.report(&CdfError::Transport(format!(
                        "upload of {} failed: {}",
                        failed.external_id, failed.reason
                    )));
                }
            }
            Err(e) => {
                warn!(error = %e, batch_size = size, "Upload batch failed");
                self.report(&e);
            }
        }
        size
    }

    /// Flush until the buffer is empty.
    async fn flush_all(&self) {
        while self.flush_once().await > 0 {}
    }

    fn report(&self, error: &CdfError) {
        if let Some(callback) = &self.config.on_error {
            callback(error);
        }
    }
}

struct Timer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Batching upload queue bound to one backend.
pub struct UploadQueue<B: FilesBackend + 'static> {
    shared: Arc<Shared<B>>,
    state: QueueState,
    timer: Option<Timer>,
}

impl<B: FilesBackend + 'static> UploadQueue<B> {
    pub fn new(backend: Arc<B>, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                backend,
                config,
                buffer: Mutex::new(VecDeque::new()),
                flush_gate: tokio::sync::Mutex::new(()),
            }),
            state: QueueState::Created,
            timer: None,
        })
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Number of units accepted but not yet handed to the backend.
    pub fn buffered(&self) -> usize {
        self.shared.buffer().len()
    }

    /// Start the periodic flush timer. Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.state != QueueState::Created {
            return Err(CdfError::InvalidState(format!(
                "cannot start an upload queue that is {:?}",
                self.state
            )));
        }

        let token = CancellationToken::new();
        let handle = spawn_timer(self.shared.clone(), token.clone());
        self.timer = Some(Timer { token, handle });
        self.state = QueueState::Running;
        info!(
            max_batch_size = self.shared.config.max_batch_size,
            max_upload_interval = ?self.shared.config.max_upload_interval,
            "Upload queue started"
        );
        Ok(())
    }

    /// Accept a unit into the buffer. When the buffer reaches the batch size,
    /// this waits for that batch to be flushed.
    pub async fn put(&self, unit: FileUnit) -> Result<()> {
        if self.state != QueueState::Running {
            return Err(CdfError::InvalidState(format!(
                "cannot put {} into an upload queue that is {:?}",
                unit.external_id(),
                self.state
            )));
        }

        let full = {
            let mut buffer = self.shared.buffer();
            buffer.push_back(unit);
            buffer.len() >= self.shared.config.max_batch_size
        };
        if full {
            self.shared.flush_once().await;
        }
        Ok(())
    }

    /// Cancel the timer, flush the remaining units and refuse further puts.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state != QueueState::Running {
            return Err(CdfError::InvalidState(format!(
                "cannot stop an upload queue that is {:?}",
                self.state
            )));
        }
        self.state = QueueState::Stopped;

        if let Some(timer) = self.timer.take() {
            timer.token.cancel();
            if let Err(e) = timer.handle.await {
                warn!(error = %e, "Upload queue timer task ended abnormally");
            }
        }

        self.shared.flush_all().await;
        info!("Upload queue stopped");
        Ok(())
    }
}

impl<B: FilesBackend + 'static> Drop for UploadQueue<B> {
    fn drop(&mut self) {
        if let Some(timer) = &self.timer {
            timer.token.cancel();
        }
    }
}

fn spawn_timer<B: FilesBackend + 'static>(
    shared: Arc<Shared<B>>,
    token: CancellationToken,
) -> JoinHandle<()> {
    let period = shared.config.max_upload_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => shared.flush_all().await,
            }
        }
        debug!("Upload queue timer stopped");
    })
}
