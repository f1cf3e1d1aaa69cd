//! Worker file lifecycle: allocate, attach, release.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use blocksweep_platform::{
    close_file, is_aligned, open_file, sync_file, AlignedBuffer, OpenOptions, PlatformError,
};
use rand::RngCore;

use crate::error::{Error, Result};
use crate::units::{format_size, MIB};

/// Size of the random buffer used to fill new files
pub const FILL_BUFFER_SIZE: usize = 2 * MIB as usize;

/// Alignment of I/O buffers, large enough for any common device block size
pub const BUFFER_ALIGNMENT: usize = 4096;

/// Path of worker `id`'s file inside `directory`
pub fn worker_path(directory: &Path, id: usize) -> PathBuf {
    directory.join(id.to_string())
}

/// One worker's backing file
///
/// A `WorkerFile` owns its descriptor. It is lent mutably to exactly one
/// worker per combination and released once at the end of the experiment.
#[derive(Debug)]
pub struct WorkerFile {
    id: usize,
    path: PathBuf,
    file: File,
    size: u64,
}

impl WorkerFile {
    /// Create `path`, fill it with `size` bytes of random data, sync it and
    /// attach to it
    ///
    /// `on_progress` is called with the number of bytes written so far after
    /// every chunk.
    pub fn allocate<F>(
        id: usize,
        path: impl Into<PathBuf>,
        size: u64,
        options: &OpenOptions,
        mut on_progress: F,
    ) -> Result<Self>
    where
        F: FnMut(u64),
    {
        let path = path.into();
        tracing::info!("worker {}: Creating file {} ({})", id, path.display(), format_size(size));

        // Direct I/O rejects a short final write
        if options.direct_io && !is_aligned(size as usize, BUFFER_ALIGNMENT) {
            return Err(Error::file(
                "Creating",
                &path,
                PlatformError::AlignmentError(format!(
                    "Size {} is not aligned to {}",
                    size, BUFFER_ALIGNMENT
                )),
            ));
        }

        let create = options.clone().create(true).sync(false);
        let mut file =
            open_file(&path, &create).map_err(|e| Error::file("Creating", &path, e))?;

        let mut buffer = AlignedBuffer::new(FILL_BUFFER_SIZE, BUFFER_ALIGNMENT);
        rand::rng().fill_bytes(buffer.as_mut_slice());

        let mut written: u64 = 0;
        while written < size {
            let chunk = (size - written).min(FILL_BUFFER_SIZE as u64) as usize;
            file.write_all(&buffer.as_slice()[..chunk])
                .map_err(|e| Error::file("Writing", &path, e.into()))?;
            written += chunk as u64;
            on_progress(written);
        }

        sync_file(&file).map_err(|e| Error::file("Syncing", &path, e))?;
        close_file(file).map_err(|e| Error::file("Closing", &path, e))?;

        Self::attach(id, path, size, options)
    }

    /// Open an existing file for unbuffered, synchronized I/O
    ///
    /// Fails if the file is smaller than `expected_size`.
    pub fn attach(
        id: usize,
        path: impl Into<PathBuf>,
        expected_size: u64,
        options: &OpenOptions,
    ) -> Result<Self> {
        let path = path.into();
        tracing::info!("worker {}: Opening file {}", id, path.display());

        let open = options.clone().create(false);
        let file = open_file(&path, &open).map_err(|e| Error::file("Opening", &path, e))?;

        let actual = file
            .metadata()
            .map_err(|e| Error::file("Inspecting", &path, e.into()))?
            .len();
        if actual < expected_size {
            return Err(Error::FileTooSmall {
                path,
                expected: expected_size,
                actual,
            });
        }

        Ok(Self {
            id,
            path,
            file,
            size: expected_size,
        })
    }

    /// Close the descriptor and keep the file on disk
    pub fn close(self) -> Result<()> {
        tracing::info!("worker {}: Closing file {}", self.id, self.path.display());
        close_file(self.file).map_err(|e| Error::file("Closing", &self.path, e))
    }

    /// Close the descriptor, then delete the file
    pub fn release(self) -> Result<()> {
        let Self { id, path, file, .. } = self;

        tracing::info!("worker {}: Closing file {}", id, path.display());
        close_file(file).map_err(|e| Error::file("Closing", &path, e))?;

        tracing::info!("worker {}: Deleting file {}", id, path.display());
        std::fs::remove_file(&path).map_err(|e| Error::file("Deleting", &path, e.into()))?;
        Ok(())
    }

    /// Worker ordinal
    pub fn id(&self) -> usize {
        self.id
    }

    /// Path on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Read for WorkerFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for WorkerFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl Seek for WorkerFile {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultClass;
    use tempfile::TempDir;

    fn buffered() -> OpenOptions {
        OpenOptions::new().direct_io(false)
    }

    #[test]
    fn test_worker_path() {
        assert_eq!(worker_path(Path::new("/data"), 0), PathBuf::from("/data/0"));
        assert_eq!(worker_path(Path::new("/data"), 12), PathBuf::from("/data/12"));
    }

    #[test]
    fn test_allocate_exact_size() {
        let dir = TempDir::new().unwrap();
        let size = 3 * MIB + 4096;
        let mut progress = Vec::new();

        let file = WorkerFile::allocate(0, dir.path().join("0"), size, &buffered(), |n| {
            progress.push(n)
        })
        .unwrap();

        assert_eq!(file.id(), 0);
        assert_eq!(file.size(), size);
        assert_eq!(std::fs::metadata(file.path()).unwrap().len(), size);
        assert_eq!(progress, vec![2 * MIB, size]);
    }

    #[test]
    fn test_allocate_random_content() {
        let dir = TempDir::new().unwrap();
        let mut file =
            WorkerFile::allocate(0, dir.path().join("0"), MIB, &buffered(), |_| {}).unwrap();

        let mut head = vec![0u8; 4096];
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_exact(&mut head).unwrap();
        assert!(head.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_allocate_rejects_unaligned_direct_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");

        let err = WorkerFile::allocate(0, &path, 10 * MIB + 512, &OpenOptions::new(), |_| {})
            .unwrap_err();
        assert!(matches!(
            err,
            Error::File {
                action: "Creating",
                source: PlatformError::AlignmentError(_),
                ..
            }
        ));
        assert!(!path.exists());

        // Buffered files take any size
        let file = WorkerFile::allocate(0, &path, 10 * MIB + 512, &buffered(), |_| {}).unwrap();
        assert_eq!(file.size(), 10 * MIB + 512);
    }

    #[test]
    fn test_attach_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1");
        std::fs::write(&path, vec![0u8; 64 * 1024]).unwrap();

        let file = WorkerFile::attach(1, &path, 32 * 1024, &buffered()).unwrap();
        assert_eq!(file.id(), 1);
        assert_eq!(file.size(), 32 * 1024);
        assert_eq!(file.path(), path.as_path());
    }

    #[test]
    fn test_attach_too_small() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");
        std::fs::write(&path, vec![0u8; 1024]).unwrap();

        let err = WorkerFile::attach(0, &path, 4096, &buffered()).unwrap_err();
        assert!(matches!(
            err,
            Error::FileTooSmall {
                expected: 4096,
                actual: 1024,
                ..
            }
        ));
        assert_eq!(err.class(), FaultClass::Io);
    }

    #[test]
    fn test_attach_missing() {
        let dir = TempDir::new().unwrap();
        let err = WorkerFile::attach(0, dir.path().join("0"), 4096, &buffered()).unwrap_err();
        assert!(matches!(err, Error::File { action: "Opening", .. }));
    }

    #[test]
    fn test_release_deletes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");
        let file = WorkerFile::allocate(0, &path, MIB, &buffered(), |_| {}).unwrap();
        assert!(path.exists());

        file.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_close_keeps_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");
        let file = WorkerFile::allocate(0, &path, MIB, &buffered(), |_| {}).unwrap();

        file.close().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), MIB);
    }

    #[test]
    fn test_release_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");
        let file = WorkerFile::allocate(0, &path, MIB, &buffered(), |_| {}).unwrap();
        std::fs::remove_file(&path).unwrap();

        let err = file.release().unwrap_err();
        assert!(matches!(err, Error::File { action: "Deleting", .. }));
    }
}
