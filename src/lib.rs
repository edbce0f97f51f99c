//! Core library entrypoint for pulse, a write-coalescing durable buffer.
//! Many concurrent appends are merged into one synchronous flush per latency
//! window; every caller in a batch observes the same outcome.

pub mod completion;
pub mod config;
pub mod scheduler;
pub mod storage;
pub mod telemetry;
pub mod util;
pub mod writer;

pub use completion::{CompletionHandle, Completer, FlushOutcome};
pub use config::WriterConfig;
pub use scheduler::{FlushScheduler, FlushTask, ManualScheduler, ThreadScheduler};
pub use storage::{AppendSink, FileSink, MemorySink, SinkOptions};
pub use telemetry::{Histogram, WriterTelemetry};
pub use util::error::{ConfigError, FlushError, OpenError, ScheduleError};
pub use writer::CoalescingWriter;
