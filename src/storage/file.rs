use super::AppendSink;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Permission bits applied when the sink file is created.
pub const DEFAULT_SINK_MODE: u32 = 0o644;

/// Creation flags and permission bits for opening a [`FileSink`].
///
/// Write-only access and per-write `fdatasync` are always applied on top of
/// these flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkOptions {
    pub create: bool,
    pub create_new: bool,
    pub truncate: bool,
    pub append: bool,
    pub mode: u32,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            create: true,
            create_new: false,
            truncate: false,
            append: true,
            mode: DEFAULT_SINK_MODE,
        }
    }
}

impl SinkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the file if needed and discard any existing content.
    pub fn create_truncate() -> Self {
        Self {
            create: true,
            truncate: true,
            append: false,
            ..Self::default()
        }
    }

    /// Open an existing file only; a missing path is an error.
    pub fn existing() -> Self {
        Self {
            create: false,
            ..Self::default()
        }
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn with_create_new(mut self, create_new: bool) -> Self {
        self.create_new = create_new;
        self
    }

    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .write(true)
            .create(self.create)
            .create_new(self.create_new)
            .truncate(self.truncate)
            .append(self.append);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(self.mode);
        }
        options
    }
}

/// Write-only file sink that enforces `write` → `fdatasync` ordering on every append.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    pub fn open(path: impl Into<PathBuf>, options: &SinkOptions) -> io::Result<Self> {
        let path = path.into();
        let file = options.open_options().open(&path)?;
        debug!(
            "event=pulse_sink_open path={} create={} truncate={} append={}",
            path.display(),
            options.create,
            options.truncate,
            options.append
        );
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AppendSink for FileSink {
    fn append_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.sync_data().map_err(|err| {
            error!(
                "event=pulse_fdatasync_failed path={} bytes={} error={}",
                self.path.display(),
                bytes.len(),
                err
            );
            err
        })
    }
}
