//! Append sinks: the durable targets a coalescing writer drains its batches into.

pub mod file;
pub mod memory;

pub use file::{FileSink, SinkOptions, DEFAULT_SINK_MODE};
pub use memory::MemorySink;

use std::io;

/// Synchronous append target.
///
/// When `append_all` returns `Ok`, every byte handed to it must already be on
/// stable storage; implementations must not buffer beneath the caller.
pub trait AppendSink: Send + 'static {
    fn append_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}
