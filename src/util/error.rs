use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// The backing sink could not be opened or created.
#[derive(Debug, Error)]
#[error("failed to open sink {path}: {source}")]
pub struct OpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl OpenError {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

/// Outcome shared by every member of a batch whose flush failed.
///
/// Cloning shares the underlying cause, so all members of one batch observe
/// the same error instance.
#[derive(Debug, Clone, Error)]
pub enum FlushError {
    #[error("sink write failed: {0}")]
    Sink(Arc<io::Error>),
    #[error("batch was dropped before its flush resolved")]
    Abandoned,
}

impl FlushError {
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            FlushError::Sink(err) => err.kind(),
            FlushError::Abandoned => io::ErrorKind::BrokenPipe,
        }
    }

    /// True when both errors carry the very same failure instance.
    pub fn shares_cause_with(&self, other: &FlushError) -> bool {
        match (self, other) {
            (FlushError::Sink(left), FlushError::Sink(right)) => Arc::ptr_eq(left, right),
            (FlushError::Abandoned, FlushError::Abandoned) => true,
            _ => false,
        }
    }
}

impl From<io::Error> for FlushError {
    fn from(err: io::Error) -> Self {
        FlushError::Sink(Arc::new(err))
    }
}

impl From<FlushError> for io::Error {
    fn from(err: FlushError) -> Self {
        io::Error::new(err.kind(), err)
    }
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("failed to spawn flush timer thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("scheduler is shut down")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
