//! macOS platform implementation
//!
//! macOS has no `O_DIRECT`; the page cache is bypassed per descriptor with
//! `fcntl(F_NOCACHE)` after opening.

use crate::{
    map_open_error, statvfs_stats, FilesystemStats, OpenOptions, PlatformError, PlatformOps,
    Result,
};
use std::fs::{File, OpenOptions as StdOpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// macOS platform implementation
pub struct MacOSPlatform;

impl PlatformOps for MacOSPlatform {
    fn open_file(path: &Path, options: &OpenOptions) -> Result<File> {
        let mut std_options = StdOpenOptions::new();
        std_options.read(true).write(true).mode(0o600);

        if options.create {
            std_options.create(true).truncate(true);
        }
        if options.sync {
            std_options.custom_flags(libc::O_DSYNC);
        }

        let file = std_options
            .open(path)
            .map_err(|e| map_open_error(path, e, options.direct_io))?;

        if options.direct_io {
            set_nocache(&file)?;
        }

        Ok(file)
    }

    fn filesystem_stats(path: &Path) -> Result<FilesystemStats> {
        statvfs_stats(path)
    }
}

/// Set F_NOCACHE on a file descriptor for direct I/O
fn set_nocache(file: &File) -> Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: fd is a valid descriptor owned by `file` for the whole call.
    #[allow(unsafe_code)]
    let result = unsafe { libc::fcntl(fd, libc::F_NOCACHE, 1) };

    if result == -1 {
        Err(PlatformError::Io(std::io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_with_nocache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");
        let file = MacOSPlatform::open_file(&path, &OpenOptions::new().create(true)).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 0);
    }

    #[test]
    fn test_filesystem_stats_tempdir() {
        let dir = TempDir::new().unwrap();
        let stats = MacOSPlatform::filesystem_stats(dir.path()).unwrap();
        assert!(stats.block_size > 0);
    }
}
