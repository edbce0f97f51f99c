use super::AppendSink;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// In-memory sink whose clones share one buffer.
///
/// Keeps a record of every write so callers can check how appends were
/// grouped, and can be told to fail writes until healed.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemorySinkState>>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    bytes: Vec<u8>,
    writes: Vec<usize>,
    failed_writes: usize,
    failure: Option<io::ErrorKind>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().bytes.clone()
    }

    /// Lengths of the successful writes, in order.
    pub fn writes(&self) -> Vec<usize> {
        self.inner.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().writes.len()
    }

    pub fn failed_writes(&self) -> usize {
        self.inner.lock().failed_writes
    }

    /// Fail every subsequent write with `kind`, leaving contents untouched.
    pub fn fail_with(&self, kind: io::ErrorKind) {
        self.inner.lock().failure = Some(kind);
    }

    pub fn heal(&self) {
        self.inner.lock().failure = None;
    }
}

impl AppendSink for MemorySink {
    fn append_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.inner.lock();
        if let Some(kind) = state.failure {
            state.failed_writes += 1;
            return Err(io::Error::new(kind, "injected sink failure"));
        }
        state.bytes.extend_from_slice(bytes);
        state.writes.push(bytes.len());
        Ok(())
    }
}
