//! Experiment configuration
//!
//! A [`Config`] is built once (from the command line and the settings file),
//! validated against the probed [`DeviceStats`], and then shared read-only by
//! every worker for the rest of the process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::probe::DeviceStats;
use crate::units::{format_size, KIB, MIB};

/// Smallest accepted file size
pub const MIN_FILE_SIZE: u64 = 10 * MIB;
/// Smallest accepted block size
pub const MIN_BLOCK_SIZE: u64 = 4 * KIB;
/// Shortest accepted run duration
pub const MIN_DURATION: Duration = Duration::from_secs(1);

/// Default file size per worker
pub const DEFAULT_FILE_SIZE: u64 = 100 * MIB;
/// Default block size
pub const DEFAULT_BLOCK_SIZE: u64 = MIB;
/// Default duration of one combination run
pub const DEFAULT_DURATION: Duration = Duration::from_secs(7);
/// Default write and random ratio sweep
pub const DEFAULT_RATIOS: [f64; 7] = [0.0, 0.2, 0.4, 0.5, 0.6, 0.8, 1.0];

/// Which phases of the experiment a process performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentMode {
    /// Create files, run the sweep, remove files
    #[default]
    CreateAndRun,
    /// Only create files
    Create,
    /// Only run the sweep against existing files
    Run,
    /// Only remove existing files
    Remove,
}

impl ExperimentMode {
    /// Whether files are allocated in this mode
    pub fn creates_files(self) -> bool {
        matches!(self, ExperimentMode::CreateAndRun | ExperimentMode::Create)
    }

    /// Whether the sweep runs in this mode
    pub fn runs_sweep(self) -> bool {
        matches!(self, ExperimentMode::CreateAndRun | ExperimentMode::Run)
    }

    /// Whether files are removed at the end of this mode
    pub fn removes_files(self) -> bool {
        matches!(self, ExperimentMode::CreateAndRun | ExperimentMode::Remove)
    }
}

impl std::fmt::Display for ExperimentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentMode::CreateAndRun => write!(f, "create-and-run"),
            ExperimentMode::Create => write!(f, "create"),
            ExperimentMode::Run => write!(f, "run"),
            ExperimentMode::Remove => write!(f, "remove"),
        }
    }
}

impl std::str::FromStr for ExperimentMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "create-and-run" => Ok(ExperimentMode::CreateAndRun),
            "create" => Ok(ExperimentMode::Create),
            "run" => Ok(ExperimentMode::Run),
            "remove" => Ok(ExperimentMode::Remove),
            _ => Err(Error::InvalidConfig(format!(
                "Unknown experiment mode '{}'. Use: create-and-run, create, run, or remove",
                s
            ))),
        }
    }
}

/// When a sequential access repositions the file offset explicitly
///
/// With [`SeekPolicy::OnWrap`] a sequential step relies on the offset having
/// advanced by exactly one block during the previous read or write, and only
/// seeks when the cursor wraps to block 0. [`SeekPolicy::Always`] seeks to the
/// cursor before every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeekPolicy {
    /// Seek on random steps and on wrap only
    #[default]
    OnWrap,
    /// Seek before every access
    Always,
}

/// Complete, immutable experiment configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    /// Directory holding the worker files
    pub directory: PathBuf,
    /// Size of each worker file in bytes
    pub file_size: u64,
    /// Number of files, which is also the number of concurrent workers
    pub number_of_files: usize,
    /// Block sizes to sweep, in bytes
    pub block_sizes: Vec<u64>,
    /// Write ratios to sweep
    pub write_ratios: Vec<f64>,
    /// Write ratios for worker 0; empty means "same as the global ratio"
    pub write_ratios_thread0: Vec<f64>,
    /// Random-access ratios to sweep
    pub random_ratios: Vec<f64>,
    /// Duration of one combination run
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Repetitions of every combination
    pub runs: u32,
    /// Bypass the page cache
    pub direct_io: bool,
    /// Sequential repositioning policy
    pub seek_policy: SeekPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_size: DEFAULT_FILE_SIZE,
            number_of_files: 1,
            block_sizes: vec![DEFAULT_BLOCK_SIZE],
            write_ratios: DEFAULT_RATIOS.to_vec(),
            write_ratios_thread0: Vec::new(),
            random_ratios: DEFAULT_RATIOS.to_vec(),
            duration: DEFAULT_DURATION,
            runs: 1,
            direct_io: true,
            seek_policy: SeekPolicy::OnWrap,
        }
    }
}

impl Config {
    /// Create a configuration for `directory` with default sweep values
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Default::default()
        }
    }

    /// Set file size in bytes
    pub fn file_size(mut self, bytes: u64) -> Self {
        self.file_size = bytes;
        self
    }

    /// Set number of files
    pub fn number_of_files(mut self, count: usize) -> Self {
        self.number_of_files = count;
        self
    }

    /// Set block sizes in bytes
    pub fn block_sizes(mut self, sizes: Vec<u64>) -> Self {
        self.block_sizes = sizes;
        self
    }

    /// Set write ratios
    pub fn write_ratios(mut self, ratios: Vec<f64>) -> Self {
        self.write_ratios = ratios;
        self
    }

    /// Set worker-0 write ratios
    pub fn write_ratios_thread0(mut self, ratios: Vec<f64>) -> Self {
        self.write_ratios_thread0 = ratios;
        self
    }

    /// Set random ratios
    pub fn random_ratios(mut self, ratios: Vec<f64>) -> Self {
        self.random_ratios = ratios;
        self
    }

    /// Set run duration
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set runs per combination
    pub fn runs(mut self, runs: u32) -> Self {
        self.runs = runs;
        self
    }

    /// Set direct I/O mode
    pub fn direct_io(mut self, direct: bool) -> Self {
        self.direct_io = direct;
        self
    }

    /// Set sequential repositioning policy
    pub fn seek_policy(mut self, policy: SeekPolicy) -> Self {
        self.seek_policy = policy;
        self
    }

    /// Path of worker `id`'s file
    pub fn file_path(&self, id: usize) -> PathBuf {
        crate::file::worker_path(&self.directory, id)
    }

    /// Platform open options matching this configuration
    pub fn open_options(&self) -> blocksweep_platform::OpenOptions {
        blocksweep_platform::OpenOptions::new().direct_io(self.direct_io)
    }

    /// Bytes across all files, or `None` if the count overflows
    pub fn total_bytes(&self) -> Option<u64> {
        u64::try_from(self.number_of_files)
            .ok()
            .and_then(|count| self.file_size.checked_mul(count))
    }

    /// Validate the file layout: directory, file count and file size
    ///
    /// This is all that creating or removing files needs.
    pub fn validate_layout(&self, device: &DeviceStats) -> Result<()> {
        validate_directory(&self.directory)?;

        if self.number_of_files < 1 {
            return Err(Error::InvalidConfig(
                "number of files must be > 0".to_string(),
            ));
        }

        if self.file_size < MIN_FILE_SIZE {
            return Err(Error::InvalidConfig(format!(
                "file size {} is below the minimum of {}",
                format_size(self.file_size),
                format_size(MIN_FILE_SIZE)
            )));
        }

        if device.block_size > 0 && self.file_size % device.block_size != 0 {
            return Err(Error::InvalidConfig(format!(
                "file size {} must be a multiple of the device block size {}",
                self.file_size, device.block_size
            )));
        }

        if self.total_bytes().is_none() {
            return Err(Error::InvalidConfig(format!(
                "{} files of {} overflow a 64-bit byte count",
                self.number_of_files,
                format_size(self.file_size)
            )));
        }

        Ok(())
    }

    /// Validate the whole configuration before any file is touched
    pub fn validate(&self, device: &DeviceStats) -> Result<()> {
        self.validate_layout(device)?;

        if self.block_sizes.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one block size is required".to_string(),
            ));
        }
        for &block_size in &self.block_sizes {
            if block_size < MIN_BLOCK_SIZE || block_size > self.file_size {
                return Err(Error::InvalidConfig(format!(
                    "block size {} must be between {} and the file size {}",
                    format_size(block_size),
                    format_size(MIN_BLOCK_SIZE),
                    format_size(self.file_size)
                )));
            }
            if device.block_size > 0 && block_size % device.block_size != 0 {
                return Err(Error::InvalidConfig(format!(
                    "block size {} must be a multiple of the device block size {}",
                    format_size(block_size),
                    format_size(device.block_size)
                )));
            }
            if self.file_size % block_size != 0 {
                return Err(Error::InvalidConfig(format!(
                    "file size {} must be a multiple of block size {}",
                    format_size(self.file_size),
                    format_size(block_size)
                )));
            }
        }

        validate_ratios("write ratio", &self.write_ratios, true)?;
        validate_ratios("thread-0 write ratio", &self.write_ratios_thread0, false)?;
        validate_ratios("random ratio", &self.random_ratios, true)?;

        if self.duration < MIN_DURATION {
            return Err(Error::InvalidConfig(format!(
                "duration must be >= {}s",
                MIN_DURATION.as_secs()
            )));
        }

        if self.runs < 1 {
            return Err(Error::InvalidConfig("runs must be >= 1".to_string()));
        }

        Ok(())
    }
}

/// File size per worker when the experiment should use `percent` of the filesystem
///
/// The filesystem capacity is converted to whole MiB, scaled by the
/// percentage and split evenly between the files.
pub fn file_size_for_percent(
    device: &DeviceStats,
    percent: u32,
    number_of_files: usize,
) -> Result<u64> {
    if percent > 100 {
        return Err(Error::InvalidConfig(
            "filesystem percent must be <= 100".to_string(),
        ));
    }
    if number_of_files < 1 {
        return Err(Error::InvalidConfig(
            "number of files must be > 0".to_string(),
        ));
    }

    let total_mib = device.total_bytes() / MIB;
    let per_file_mib = total_mib * u64::from(percent) / 100 / number_of_files as u64;
    Ok(per_file_mib * MIB)
}

fn validate_directory(directory: &Path) -> Result<()> {
    match std::fs::metadata(directory) {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => Err(Error::InvalidConfig(format!(
            "invalid directory {}",
            directory.display()
        ))),
    }
}

fn validate_ratios(name: &str, ratios: &[f64], required: bool) -> Result<()> {
    if required && ratios.is_empty() {
        return Err(Error::InvalidConfig(format!("at least one {} is required", name)));
    }
    match ratios.iter().find(|r| !(0.0..=1.0).contains(*r)) {
        Some(r) => Err(Error::InvalidConfig(format!(
            "{} {} must be between 0 and 1",
            name, r
        ))),
        None => Ok(()),
    }
}

/// Serde helper for Duration as seconds
mod duration_secs {
    use serde::{Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }
}
