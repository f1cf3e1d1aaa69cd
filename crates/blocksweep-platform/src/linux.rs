//! Linux platform implementation
//!
//! Uses `O_DIRECT` to bypass the page cache and `O_DSYNC` for synchronous
//! data writes.

use crate::{map_open_error, statvfs_stats, FilesystemStats, OpenOptions, PlatformOps, Result};
use std::fs::{File, OpenOptions as StdOpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Linux platform implementation
pub struct LinuxPlatform;

impl PlatformOps for LinuxPlatform {
    fn open_file(path: &Path, options: &OpenOptions) -> Result<File> {
        let mut std_options = StdOpenOptions::new();
        std_options.read(true).write(true).mode(0o600);

        if options.create {
            std_options.create(true).truncate(true);
        }

        let mut flags = 0;
        if options.direct_io {
            flags |= libc::O_DIRECT;
        }
        if options.sync {
            flags |= libc::O_DSYNC;
        }
        std_options.custom_flags(flags);

        tracing::trace!(
            "open({}) direct_io={} sync={} create={}",
            path.display(),
            options.direct_io,
            options.sync,
            options.create
        );

        std_options
            .open(path)
            .map_err(|e| map_open_error(path, e, options.direct_io))
    }

    fn filesystem_stats(path: &Path) -> Result<FilesystemStats> {
        statvfs_stats(path)
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{close_file, sync_file, PlatformError};
    use std::io::{Read, Seek, SeekFrom, Write};
    use tempfile::TempDir;

    fn buffered() -> OpenOptions {
        OpenOptions::new().direct_io(false)
    }

    #[test]
    fn test_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = LinuxPlatform::open_file(&dir.path().join("missing"), &buffered());
        assert!(matches!(result, Err(PlatformError::NotFound(_))));
    }

    #[test]
    fn test_create_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");
        std::fs::write(&path, vec![1u8; 8192]).unwrap();

        let file = LinuxPlatform::open_file(&path, &buffered().create(true)).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 0);
    }

    #[test]
    fn test_read_write_positioned() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");
        std::fs::write(&path, vec![0u8; 8192]).unwrap();

        let mut file = LinuxPlatform::open_file(&path, &buffered()).unwrap();
        file.seek(SeekFrom::Start(4096)).unwrap();
        file.write_all(b"blocksweep").unwrap();
        sync_file(&file).unwrap();

        file.seek(SeekFrom::Start(4096)).unwrap();
        let mut buf = [0u8; 10];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"blocksweep");

        close_file(file).unwrap();
    }

    #[test]
    fn test_filesystem_stats_tempdir() {
        let dir = TempDir::new().unwrap();
        let stats = LinuxPlatform::filesystem_stats(dir.path()).unwrap();
        assert!(stats.block_size > 0);
        assert!(stats.fragment_size > 0);
        assert!(stats.free_blocks >= stats.available_blocks);
    }

    #[test]
    fn test_filesystem_stats_missing_path() {
        let result = LinuxPlatform::filesystem_stats(Path::new("/nonexistent/blocksweep/dir"));
        assert!(matches!(result, Err(PlatformError::StatFailed { .. })));
    }
}
