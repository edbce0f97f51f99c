//! Write-coalescing durable buffer.
//!
//! Concurrent [`CoalescingWriter::append`] calls accumulate into one pending
//! batch. The append that finds the writer empty arms a single delayed flush;
//! when it fires, the whole batch goes to the sink in one durable write and
//! every member is released with the same outcome.

use crate::completion::{self, Completer, CompletionHandle, FlushOutcome};
use crate::scheduler::{FlushScheduler, ThreadScheduler};
use crate::storage::{AppendSink, FileSink, SinkOptions};
use crate::telemetry::{WriterMetrics, WriterTelemetry};
use crate::util::error::{FlushError, OpenError};
use log::{debug, warn};
use parking_lot::Mutex;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct CoalescingWriter<S: AppendSink> {
    shared: Arc<WriterShared<S>>,
    scheduler: Arc<dyn FlushScheduler>,
}

struct WriterShared<S> {
    latency: Duration,
    state: Mutex<WriterState<S>>,
}

struct WriterState<S> {
    sink: S,
    batch: PendingBatch,
    metrics: WriterMetrics,
}

/// Payloads and waiters accumulated since the last flush.
#[derive(Debug, Default)]
struct PendingBatch {
    payload: Vec<u8>,
    members: Vec<Completer>,
}

impl PendingBatch {
    fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn admit(&mut self, payload: &[u8]) -> CompletionHandle {
        let (completer, handle) = completion::channel();
        self.payload.extend_from_slice(payload);
        self.members.push(completer);
        handle
    }
}

impl CoalescingWriter<FileSink> {
    /// Opens `path` for durable, write-only appends and wraps it in a writer
    /// that flushes each batch `latency` after its first append.
    pub fn open(
        path: impl Into<PathBuf>,
        options: SinkOptions,
        latency: Duration,
    ) -> Result<Self, OpenError> {
        let path = path.into();
        let sink = FileSink::open(&path, &options).map_err(|err| OpenError::new(&path, err))?;
        Ok(Self::with_sink(sink, latency))
    }
}

impl<S: AppendSink> CoalescingWriter<S> {
    pub fn with_sink(sink: S, latency: Duration) -> Self {
        Self::with_scheduler(sink, latency, Arc::new(ThreadScheduler::new()))
    }

    pub fn with_scheduler(
        sink: S,
        latency: Duration,
        scheduler: Arc<dyn FlushScheduler>,
    ) -> Self {
        Self {
            shared: Arc::new(WriterShared {
                latency,
                state: Mutex::new(WriterState {
                    sink,
                    batch: PendingBatch::default(),
                    metrics: WriterMetrics::new(),
                }),
            }),
            scheduler,
        }
    }

    pub fn latency(&self) -> Duration {
        self.shared.latency
    }

    /// Adds `payload` to the pending batch and blocks until that batch has
    /// been flushed. Returns the payload length once it is durable, or the
    /// failure shared by every member of the batch.
    pub fn append(&self, payload: &[u8]) -> Result<usize, FlushError> {
        let handle = {
            let mut state = self.shared.state.lock();
            let fresh = state.batch.is_empty();
            let handle = state.batch.admit(payload);
            state.metrics.record_append(payload.len());
            if fresh {
                self.arm_flush(&mut state);
            }
            handle
        };
        handle.wait()?;
        Ok(payload.len())
    }

    pub fn telemetry(&self) -> WriterTelemetry {
        self.shared.state.lock().metrics.snapshot()
    }

    /// Number of callers waiting in the current batch.
    pub fn pending_members(&self) -> usize {
        self.shared.state.lock().batch.members.len()
    }

    fn arm_flush(&self, state: &mut WriterState<S>) {
        let shared = Arc::clone(&self.shared);
        let task = Box::new(move || shared.flush());
        match self.scheduler.schedule(self.shared.latency, task) {
            Ok(()) => state.metrics.record_timer_armed(),
            Err(err) => {
                // Nothing else would ever drain this batch, so drain it here.
                warn!("event=pulse_timer_arm_failed fallback=inline_flush error={err}");
                state.metrics.record_timer_arm_failure();
                state.flush_batch();
            }
        }
    }
}

impl<S: AppendSink> WriterShared<S> {
    fn flush(&self) {
        self.state.lock().flush_batch();
    }
}

impl<S: AppendSink> WriterState<S> {
    /// Writes the pending batch in one call and resolves every member.
    /// Must be called with the writer lock held.
    fn flush_batch(&mut self) {
        let members = std::mem::take(&mut self.batch.members);
        if members.is_empty() {
            return;
        }
        let mut payload = std::mem::take(&mut self.batch.payload);
        let started = Instant::now();
        let outcome: FlushOutcome = self.sink.append_all(&payload).map_err(FlushError::from);
        let elapsed_us = micros_saturating(started.elapsed());
        let bytes = payload.len();
        self.metrics.record_flush(members.len(), bytes, elapsed_us, outcome.is_ok());
        match &outcome {
            Ok(()) => debug!(
                "event=pulse_flush members={} bytes={} elapsed_us={}",
                members.len(),
                bytes,
                elapsed_us
            ),
            Err(err) => debug!(
                "event=pulse_flush_failed members={} bytes={} error={}",
                members.len(),
                bytes,
                err
            ),
        }
        for member in members {
            member.complete(outcome.clone());
        }
        // Keep the allocation for the next batch.
        payload.clear();
        self.batch.payload = payload;
    }
}

fn micros_saturating(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

impl<S: AppendSink> io::Write for &CoalescingWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.append(buf)?)
    }

    /// Every successful `write` is already durable.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: AppendSink> io::Write for CoalescingWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.append(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: AppendSink> std::fmt::Debug for CoalescingWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingWriter")
            .field("latency", &self.shared.latency)
            .field("pending_members", &self.pending_members())
            .finish()
    }
}
