//! # Blocksweep Platform
//!
//! Platform-specific adapters for unbuffered file I/O and filesystem probing.
//!
//! Benchmark files are opened with the page cache bypassed (`O_DIRECT` on
//! Linux, `F_NOCACHE` on macOS) and with synchronous data writes (`O_DSYNC`),
//! so that every read and write issued by a worker reaches the device.
//! Direct I/O imposes alignment rules on buffers, offsets and lengths;
//! [`AlignedBuffer`] provides buffers that satisfy them.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Access denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// File or directory not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Filesystem statistics could not be read
    #[error("Cannot read filesystem data from {path}: {source}")]
    StatFailed {
        /// Path that was probed
        path: String,
        /// The underlying error
        source: std::io::Error,
    },

    /// Operation not supported on this platform or filesystem
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Alignment error for direct I/O
    #[error("Alignment error: {0}")]
    AlignmentError(String),
}

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Options for opening a benchmark file
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Bypass the page cache
    pub direct_io: bool,

    /// Synchronous data writes (`O_DSYNC`)
    pub sync: bool,

    /// Create the file, truncating any existing content
    pub create: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            direct_io: true,
            sync: true,
            create: false,
        }
    }
}

impl OpenOptions {
    /// Create new options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set direct I/O mode
    pub fn direct_io(mut self, direct: bool) -> Self {
        self.direct_io = direct;
        self
    }

    /// Set synchronous writes
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Set create-and-truncate mode
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }
}

/// Filesystem statistics for the filesystem holding a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilesystemStats {
    /// Preferred I/O block size in bytes
    pub block_size: u64,
    /// Unit of the block counts below, in bytes
    pub fragment_size: u64,
    /// Total blocks on the filesystem
    pub total_blocks: u64,
    /// Free blocks
    pub free_blocks: u64,
    /// Free blocks available to unprivileged users
    pub available_blocks: u64,
}

impl FilesystemStats {
    /// Total capacity in bytes
    pub fn total_bytes(&self) -> u64 {
        self.total_blocks.saturating_mul(self.fragment_size)
    }

    /// Capacity available to unprivileged users in bytes
    pub fn available_bytes(&self) -> u64 {
        self.available_blocks.saturating_mul(self.fragment_size)
    }
}

/// Platform operations interface
pub trait PlatformOps {
    /// Open a benchmark file for positioned read/write I/O
    fn open_file(path: &Path, options: &OpenOptions) -> Result<File>;

    /// Read statistics of the filesystem containing `path`
    fn filesystem_stats(path: &Path) -> Result<FilesystemStats>;
}

/// Align a value up to the given alignment (a power of two)
#[inline]
pub fn align_up(value: usize, alignment: usize) -> usize {
    if alignment == 0 {
        return value;
    }
    (value + alignment - 1) & !(alignment - 1)
}

/// Check if a value is aligned to the given alignment
// Note: Using manual check instead of `is_multiple_of()` for nightly sanitizer compatibility
#[allow(clippy::manual_is_multiple_of)]
#[inline]
pub fn is_aligned(value: usize, alignment: usize) -> bool {
    if alignment == 0 {
        return true;
    }
    value % alignment == 0
}

/// Heap buffer whose start address is aligned for direct I/O
///
/// The backing vector is over-allocated by one alignment unit and the usable
/// window starts at the first aligned address inside it.
pub struct AlignedBuffer {
    data: Vec<u8>,
    offset: usize,
    len: usize,
}

impl AlignedBuffer {
    /// Allocate a zeroed buffer of `len` bytes aligned to `alignment`
    ///
    /// Non power-of-two alignments are rounded up to the next power of two.
    pub fn new(len: usize, alignment: usize) -> Self {
        let alignment = alignment.max(1).next_power_of_two();
        let data = vec![0u8; len + alignment];
        let base = data.as_ptr() as usize;
        let offset = align_up(base, alignment) - base;
        Self { data, offset, len }
    }

    /// Usable length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer has zero usable length
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Aligned read-only view
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.len]
    }

    /// Aligned mutable view
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.offset..self.offset + self.len]
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("offset", &self.offset)
            .finish()
    }
}

/// Map an `open(2)` failure to a platform error
fn map_open_error(path: &Path, err: std::io::Error, direct_io: bool) -> PlatformError {
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => {
            PlatformError::PermissionDenied(format!("Cannot open {}: {}", path.display(), err))
        }
        std::io::ErrorKind::NotFound => PlatformError::NotFound(path.display().to_string()),
        std::io::ErrorKind::InvalidInput if direct_io => PlatformError::NotSupported(format!(
            "{}: filesystem rejected direct I/O ({}). Try --no-direct-io.",
            path.display(),
            err
        )),
        _ => PlatformError::Io(err),
    }
}

/// Query filesystem statistics through `statvfs(3)`
#[cfg(unix)]
fn statvfs_stats(path: &Path) -> Result<FilesystemStats> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        PlatformError::NotFound(format!("{} contains a NUL byte", path.display()))
    })?;

    let mut buf = std::mem::MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: c_path is a valid NUL-terminated string and buf points to writable
    // storage large enough for a statvfs structure.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), buf.as_mut_ptr()) };
    if rc != 0 {
        return Err(PlatformError::StatFailed {
            path: path.display().to_string(),
            source: std::io::Error::last_os_error(),
        });
    }
    // SAFETY: statvfs returned 0, so the structure has been fully initialised.
    #[allow(unsafe_code)]
    let buf = unsafe { buf.assume_init() };

    let block_size = buf.f_bsize as u64;
    let fragment_size = match buf.f_frsize as u64 {
        0 => block_size,
        n => n,
    };

    let stats = FilesystemStats {
        block_size,
        fragment_size,
        total_blocks: buf.f_blocks as u64,
        free_blocks: buf.f_bfree as u64,
        available_blocks: buf.f_bavail as u64,
    };
    tracing::debug!("statvfs({}) = {:?}", path.display(), stats);
    Ok(stats)
}

/// Close a file and report the result of `close(2)`
///
/// Dropping a [`File`] silently discards close errors; benchmark files are
/// released through this function instead so a failing close is visible.
#[cfg(unix)]
pub fn close_file(file: File) -> Result<()> {
    use std::os::unix::io::IntoRawFd;

    let fd = file.into_raw_fd();
    // SAFETY: fd was just released from an owned File, so it is open and no
    // other owner will close it again.
    #[allow(unsafe_code)]
    let result = unsafe { libc::close(fd) };
    if result == 0 {
        Ok(())
    } else {
        Err(PlatformError::Io(std::io::Error::last_os_error()))
    }
}

/// Close a file (non-Unix platforms report no close status)
#[cfg(not(unix))]
pub fn close_file(file: File) -> Result<()> {
    drop(file);
    Ok(())
}

/// Flush file data and metadata to the device
pub fn sync_file(file: &File) -> Result<()> {
    file.sync_all().map_err(PlatformError::Io)
}

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        pub use linux::LinuxPlatform as Platform;
    } else if #[cfg(target_os = "macos")] {
        mod macos;
        pub use macos::MacOSPlatform as Platform;
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "macos"))] {
        /// Open a benchmark file using platform defaults
        pub fn open_file(path: &Path, options: &OpenOptions) -> Result<File> {
            Platform::open_file(path, options)
        }

        /// Read statistics of the filesystem containing `path`
        pub fn filesystem_stats(path: &Path) -> Result<FilesystemStats> {
            Platform::filesystem_stats(path)
        }
    } else {
        /// Open a benchmark file (unsupported platform)
        pub fn open_file(_path: &Path, _options: &OpenOptions) -> Result<File> {
            Err(PlatformError::NotSupported("Platform not supported".to_string()))
        }

        /// Read filesystem statistics (unsupported platform)
        pub fn filesystem_stats(_path: &Path) -> Result<FilesystemStats> {
            Err(PlatformError::NotSupported("Platform not supported".to_string()))
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
