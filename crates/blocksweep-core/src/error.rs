//! Error types for the Blocksweep core library

use std::path::PathBuf;

use blocksweep_platform::PlatformError;
use thiserror::Error;

/// Which fault class an error belongs to
///
/// Configuration faults are found before any file is touched and are fixed by
/// re-invoking with different options. I/O faults end the run: the sweep stops
/// at the first one, emits no row for the combination in progress and leaves
/// files as they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Invalid options or unusable directory
    Configuration,
    /// Failure while creating, opening, accessing or removing a file
    Io,
}

/// I/O operation a worker was performing when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    /// Repositioning the file offset
    Seek,
    /// Reading one block
    Read,
    /// Writing one block
    Write,
}

impl std::fmt::Display for IoOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoOp::Seek => write!(f, "seek"),
            IoOp::Read => write!(f, "read"),
            IoOp::Write => write!(f, "write"),
        }
    }
}

/// Main error type for Blocksweep operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem statistics could not be read
    #[error("Cannot probe {path}: {source}")]
    Probe {
        /// Directory that was probed
        path: PathBuf,
        /// The underlying platform error
        source: PlatformError,
    },

    /// File lifecycle operation failed
    #[error("{action} {path}: {source}")]
    File {
        /// What was being done ("Creating", "Opening", ...)
        action: &'static str,
        /// File involved
        path: PathBuf,
        /// The underlying platform error
        source: PlatformError,
    },

    /// Existing file is smaller than the configured size
    #[error("File {path} is {actual} bytes, expected at least {expected}")]
    FileTooSmall {
        /// File involved
        path: PathBuf,
        /// Required size in bytes
        expected: u64,
        /// Size found on disk
        actual: u64,
    },

    /// A worker's read, write or seek failed
    #[error("Worker {worker} {op} error: {source}")]
    WorkerIo {
        /// Worker ordinal
        worker: usize,
        /// Operation that failed
        op: IoOp,
        /// The underlying error
        source: std::io::Error,
    },

    /// A worker thread panicked
    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),

    /// A worker stopped because the run was aborted
    #[error("Run aborted")]
    Aborted,

    /// IO error outside a worker
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Fault class of this error
    pub fn class(&self) -> FaultClass {
        match self {
            Error::InvalidConfig(_) | Error::Probe { .. } => FaultClass::Configuration,
            Error::File { .. }
            | Error::FileTooSmall { .. }
            | Error::WorkerIo { .. }
            | Error::WorkerPanicked(_)
            | Error::Aborted
            | Error::Io(_) => FaultClass::Io,
        }
    }

    /// Whether this error must abort the whole run
    pub fn is_fatal_io(&self) -> bool {
        self.class() == FaultClass::Io
    }

    pub(crate) fn file(action: &'static str, path: impl Into<PathBuf>, source: PlatformError) -> Self {
        Error::File {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using the Blocksweep error type
pub type Result<T> = std::result::Result<T, Error>;
