//! One invocation of the benchmark: file setup, sweep and teardown
//!
//! The phases that run depend on the [`ExperimentMode`]. Each mode works on
//! its own, so files created by a `create` invocation can be swept by a later
//! `run` and deleted by a `remove`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Config, ExperimentMode};
use crate::error::{Error, Result};
use crate::file::WorkerFile;
use crate::probe::{DeviceProbe, DeviceStats};
use crate::report::ResultRow;
use crate::sweep::SweepRunner;
use crate::units::format_size;

/// What an experiment did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentSummary {
    /// Mode that ran
    pub mode: ExperimentMode,
    /// Files created or attached
    pub files: usize,
    /// Result rows emitted
    pub rows: usize,
    /// Wall time of the whole experiment
    pub elapsed: Duration,
}

/// A validated experiment ready to execute
#[derive(Debug, Clone)]
pub struct Experiment {
    config: Config,
    mode: ExperimentMode,
    device: DeviceStats,
}

impl Experiment {
    /// Validate `config` for `mode` against `device`
    ///
    /// Modes that run the sweep need the full configuration; the others only
    /// need the file layout.
    pub fn new(config: Config, mode: ExperimentMode, device: DeviceStats) -> Result<Self> {
        if mode.runs_sweep() {
            config.validate(&device)?;
        } else {
            config.validate_layout(&device)?;
        }

        tracing::info!(
            "Experiment {}: {} files of {} in {}",
            mode,
            config.number_of_files,
            format_size(config.file_size),
            config.directory.display()
        );

        Ok(Self {
            config,
            mode,
            device,
        })
    }

    /// Probe the configured directory, then validate
    pub fn probe<P: DeviceProbe>(config: Config, mode: ExperimentMode, probe: &P) -> Result<Self> {
        let device = probe.stats(&config.directory)?;
        Self::new(config, mode, device)
    }

    /// Validated configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mode this experiment runs in
    pub fn mode(&self) -> ExperimentMode {
        self.mode
    }

    /// Statistics of the target filesystem
    pub fn device(&self) -> &DeviceStats {
        &self.device
    }

    /// Total bytes this experiment allocates
    pub fn allocation_bytes(&self) -> u64 {
        if self.mode.creates_files() {
            self.config.total_bytes().unwrap_or(u64::MAX)
        } else {
            0
        }
    }

    /// Create or attach every worker file
    ///
    /// `on_progress` receives the worker id and the bytes written to its file
    /// so far; it is only called while creating.
    pub fn open_files<F>(&self, abort: &AtomicBool, mut on_progress: F) -> Result<Vec<WorkerFile>>
    where
        F: FnMut(usize, u64),
    {
        let options = self.config.open_options();
        let expected_size = if self.mode.runs_sweep() {
            self.config.file_size
        } else {
            0
        };

        let mut files = Vec::with_capacity(self.config.number_of_files);
        for id in 0..self.config.number_of_files {
            if abort.load(Ordering::Relaxed) {
                return Err(Error::Aborted);
            }

            let path = self.config.file_path(id);
            let file = if self.mode.creates_files() {
                WorkerFile::allocate(id, path, self.config.file_size, &options, |written| {
                    on_progress(id, written)
                })?
            } else {
                WorkerFile::attach(id, path, expected_size, &options)?
            };
            files.push(file);
        }
        Ok(files)
    }

    /// Run every phase of the mode
    ///
    /// Rows go to `on_row` as each combination finishes, stamped with the
    /// time since the sweep began. The summary's elapsed time covers every
    /// phase. On failure the error is returned as is and files stay on disk.
    pub fn execute<F, R>(
        &self,
        abort: Arc<AtomicBool>,
        on_progress: F,
        on_row: R,
    ) -> Result<ExperimentSummary>
    where
        F: FnMut(usize, u64),
        R: FnMut(&ResultRow) -> Result<()>,
    {
        let started = Instant::now();
        let mut files = self.open_files(&abort, on_progress)?;

        // Row timestamps count from here, after allocation
        let rows = if self.mode.runs_sweep() {
            SweepRunner::new(&self.config)
                .with_abort_flag(abort)
                .with_start(Instant::now())
                .run(&mut files, on_row)?
        } else {
            0
        };

        let count = files.len();
        for file in files {
            if self.mode.removes_files() {
                file.release()?;
            } else {
                file.close()?;
            }
        }

        let elapsed = started.elapsed();
        tracing::info!(
            "Experiment {} finished: {} rows in {:.1}s",
            self.mode,
            rows,
            elapsed.as_secs_f64()
        );

        Ok(ExperimentSummary {
            mode: self.mode,
            files: count,
            rows,
            elapsed,
        })
    }
}
