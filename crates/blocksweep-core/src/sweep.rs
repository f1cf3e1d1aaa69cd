//! Parameter sweep over concurrent workers
//!
//! The sweep walks the grid of write ratio, thread-0 write ratio, random
//! ratio, block size and run index in a fixed order. Each point fans out one
//! [`AccessWorker`] per file on its own scoped thread, waits for all of them
//! and turns their samples into one [`ResultRow`]. Points never overlap.

use std::io::{Read, Seek, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::report::ResultRow;
use crate::units::{format_size, format_throughput};
use crate::worker::{AccessParams, AccessWorker, ThroughputSample};

/// One point of the sweep grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Combination {
    /// Write ratio of every worker except worker 0
    pub write_ratio: f64,
    /// Write ratio of worker 0
    pub write_ratio_thread0: f64,
    /// Random-access ratio
    pub random_ratio: f64,
    /// Block size in bytes
    pub block_size: u64,
    /// Repetition index, starting at 0
    pub run: u32,
}

impl Combination {
    /// Access parameters for `worker`
    pub fn params_for(&self, worker: usize) -> AccessParams {
        AccessParams {
            block_size: self.block_size,
            write_ratio: if worker == 0 {
                self.write_ratio_thread0
            } else {
                self.write_ratio
            },
            random_ratio: self.random_ratio,
        }
    }
}

/// Every combination of `config`, in execution order
///
/// Outer to inner: write ratio, thread-0 write ratio, random ratio, block
/// size, run. Without a thread-0 set, worker 0 follows the write ratio.
pub fn combinations(config: &Config) -> Vec<Combination> {
    let mut grid = Vec::new();
    for &write_ratio in &config.write_ratios {
        let thread0: &[f64] = if config.write_ratios_thread0.is_empty() {
            std::slice::from_ref(&write_ratio)
        } else {
            &config.write_ratios_thread0
        };
        for &write_ratio_thread0 in thread0 {
            for &random_ratio in &config.random_ratios {
                for &block_size in &config.block_sizes {
                    for run in 0..config.runs {
                        grid.push(Combination {
                            write_ratio,
                            write_ratio_thread0,
                            random_ratio,
                            block_size,
                            run,
                        });
                    }
                }
            }
        }
    }
    grid
}

/// Drives the sweep over a set of devices
pub struct SweepRunner<'a> {
    config: &'a Config,
    abort: Arc<AtomicBool>,
    started: Instant,
}

impl<'a> SweepRunner<'a> {
    /// Create a runner; elapsed times in rows are measured from now
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            abort: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
        }
    }

    /// Share an externally owned abort flag
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = flag;
        self
    }

    /// Measure row elapsed times from `started`
    pub fn with_start(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    /// Flag that stops every worker at its next batch boundary when set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Run every combination, handing each row to `on_row` as soon as it is
    /// complete
    ///
    /// Worker ids are positions in `devices`. Returns the number of rows
    /// emitted. The first failure stops the sweep; no row is produced for
    /// the combination in progress.
    pub fn run<T, F>(&self, devices: &mut [T], mut on_row: F) -> Result<usize>
    where
        T: Read + Write + Seek + Send,
        F: FnMut(&ResultRow) -> Result<()>,
    {
        if devices.is_empty() {
            return Err(Error::InvalidConfig(
                "the sweep needs at least one file".to_string(),
            ));
        }

        let grid = combinations(self.config);
        tracing::info!(
            "Running {} combinations on {} workers, {}s each",
            grid.len(),
            devices.len(),
            self.config.duration.as_secs_f64()
        );

        for (index, combination) in grid.iter().enumerate() {
            tracing::info!(
                "[{}/{}] block_size={}, write_ratio={:.1}, write_ratio_thread0={:.1}, random_ratio={:.1}, run={}",
                index + 1,
                grid.len(),
                format_size(combination.block_size),
                combination.write_ratio,
                combination.write_ratio_thread0,
                combination.random_ratio,
                combination.run
            );

            let samples = self.run_combination(devices, combination)?;
            let row = ResultRow::new(self.started.elapsed(), combination, &samples);
            tracing::debug!("total throughput {}", format_throughput(row.total_kib));
            on_row(&row)?;
        }

        Ok(grid.len())
    }

    /// Run one combination on every device concurrently and wait for all of
    /// them
    ///
    /// Samples are returned ordered by worker id.
    pub fn run_combination<T>(
        &self,
        devices: &mut [T],
        combination: &Combination,
    ) -> Result<Vec<ThroughputSample>>
    where
        T: Read + Write + Seek + Send,
    {
        if self.abort.load(Ordering::Relaxed) {
            return Err(Error::Aborted);
        }

        let config = self.config;
        let outcomes: Vec<Result<ThroughputSample>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(devices.len());
            let mut spawn_failure = None;

            for (id, device) in devices.iter_mut().enumerate() {
                let worker = AccessWorker::new(
                    id,
                    config.file_size,
                    combination.params_for(id),
                    config.duration,
                )
                .seek_policy(config.seek_policy)
                .abort_flag(Arc::clone(&self.abort));
                let abort = Arc::clone(&self.abort);

                let spawned = thread::Builder::new()
                    .name(format!("worker-{}", id))
                    .spawn_scoped(scope, move || {
                        let result = worker.run(device);
                        if result.is_err() {
                            abort.store(true, Ordering::Relaxed);
                        }
                        result
                    });

                match spawned {
                    Ok(handle) => handles.push((id, handle)),
                    Err(e) => {
                        self.abort.store(true, Ordering::Relaxed);
                        spawn_failure = Some(Error::Io(e));
                        break;
                    }
                }
            }

            let mut outcomes: Vec<Result<ThroughputSample>> = handles
                .into_iter()
                .map(|(id, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        self.abort.store(true, Ordering::Relaxed);
                        Err(Error::WorkerPanicked(id))
                    })
                })
                .collect();
            if let Some(err) = spawn_failure {
                outcomes.push(Err(err));
            }
            outcomes
        });

        collect_samples(outcomes)
    }
}

/// Samples in order, or the most informative error
///
/// A worker that stopped because a sibling failed reports `Aborted`; the
/// sibling's own error is the one returned.
fn collect_samples(outcomes: Vec<Result<ThroughputSample>>) -> Result<Vec<ThroughputSample>> {
    let mut samples = Vec::with_capacity(outcomes.len());
    let mut failure: Option<Error> = None;

    for outcome in outcomes {
        match outcome {
            Ok(sample) => samples.push(sample),
            Err(err) => {
                tracing::debug!("worker failed: {}", err);
                failure = match failure {
                    None | Some(Error::Aborted) => Some(err),
                    kept => kept,
                };
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(samples),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IoOp;
    use std::io::{Cursor, SeekFrom};
    use std::time::Duration;

    const BLOCK: u64 = 4096;
    const BLOCKS: u64 = 16;

    /// In-memory device that can be told to fail
    struct Device {
        inner: Cursor<Vec<u8>>,
        fail_writes: bool,
        panic_on_read: bool,
    }

    impl Device {
        fn new() -> Self {
            Self {
                inner: Cursor::new(vec![0u8; (BLOCKS * BLOCK) as usize]),
                fail_writes: false,
                panic_on_read: false,
            }
        }
    }

    impl Read for Device {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.panic_on_read {
                panic!("read on poisoned device");
            }
            self.inner.read(buf)
        }
    }

    impl Write for Device {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.fail_writes {
                return Err(std::io::Error::other("injected write failure"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for Device {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    fn config() -> Config {
        Config::new(".")
            .file_size(BLOCKS * BLOCK)
            .block_sizes(vec![BLOCK])
            .write_ratios(vec![0.0, 1.0])
            .random_ratios(vec![0.0])
            .duration(Duration::from_millis(20))
    }

    fn devices(count: usize) -> Vec<Device> {
        (0..count).map(|_| Device::new()).collect()
    }

    #[test]
    fn test_combination_order() {
        let config = config()
            .random_ratios(vec![0.0, 0.5])
            .block_sizes(vec![BLOCK, 2 * BLOCK])
            .runs(2);
        let grid = combinations(&config);
        assert_eq!(grid.len(), 2 * 2 * 2 * 2);

        assert_eq!(
            grid[0],
            Combination {
                write_ratio: 0.0,
                write_ratio_thread0: 0.0,
                random_ratio: 0.0,
                block_size: BLOCK,
                run: 0,
            }
        );
        assert_eq!(grid[1].run, 1);
        assert_eq!(grid[2].block_size, 2 * BLOCK);
        assert_eq!(grid[4].random_ratio, 0.5);
        assert_eq!(grid[8].write_ratio, 1.0);
        assert!(grid.iter().all(|c| c.write_ratio_thread0 == c.write_ratio));
    }

    #[test]
    fn test_thread0_dimension() {
        let config = config()
            .write_ratios(vec![0.0, 0.5])
            .write_ratios_thread0(vec![1.0, 0.2]);
        let grid = combinations(&config);

        let pairs: Vec<(f64, f64)> = grid
            .iter()
            .map(|c| (c.write_ratio, c.write_ratio_thread0))
            .collect();
        assert_eq!(pairs, vec![(0.0, 1.0), (0.0, 0.2), (0.5, 1.0), (0.5, 0.2)]);

        let params0 = grid[0].params_for(0);
        let params1 = grid[0].params_for(1);
        assert_eq!(params0.write_ratio, 1.0);
        assert_eq!(params1.write_ratio, 0.0);
        assert_eq!(params0.block_size, params1.block_size);
    }

    #[test]
    fn test_run_emits_rows_in_order() {
        let config = config();
        let mut devices = devices(2);
        let mut rows = Vec::new();

        let emitted = SweepRunner::new(&config)
            .run(&mut devices, |row| {
                rows.push(row.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(emitted, 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].write_ratio, 0.0);
        assert_eq!(rows[1].write_ratio, 1.0);
        assert!(rows[0].elapsed <= rows[1].elapsed);
        for row in &rows {
            assert_eq!(row.workers_kib.len(), 2);
            assert!(row.workers_kib.iter().all(|&t| t > 0.0));
            let sum: f64 = row.workers_kib.iter().sum();
            assert!((row.total_kib - sum).abs() < 1e-6);
        }
    }

    #[test]
    fn test_thread0_override_applies_to_worker_zero_only() {
        let config = config();
        let combination = Combination {
            write_ratio: 0.0,
            write_ratio_thread0: 1.0,
            random_ratio: 0.0,
            block_size: BLOCK,
            run: 0,
        };
        let mut devices = devices(3);

        let samples = SweepRunner::new(&config)
            .run_combination(&mut devices, &combination)
            .unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].worker, 0);
        assert_eq!(samples[0].reads, 0);
        assert!(samples[0].writes > 0);
        for sample in &samples[1..] {
            assert_eq!(sample.writes, 0);
            assert!(sample.reads > 0);
        }
    }

    #[test]
    fn test_worker_failure_stops_sweep_without_row() {
        let config = config();
        let mut devices = devices(3);
        devices[1].fail_writes = true;
        let mut rows = 0;

        let err = SweepRunner::new(&config)
            .run(&mut devices, |_| {
                rows += 1;
                Ok(())
            })
            .unwrap_err();

        // write ratio 0.0 completes, 1.0 fails on worker 1
        assert_eq!(rows, 1);
        assert!(matches!(
            err,
            Error::WorkerIo {
                worker: 1,
                op: IoOp::Write,
                ..
            }
        ));
    }

    #[test]
    fn test_sibling_failure_aborts_other_workers() {
        let config = config().duration(Duration::from_secs(30));
        let combination = Combination {
            write_ratio: 1.0,
            write_ratio_thread0: 1.0,
            random_ratio: 0.0,
            block_size: BLOCK,
            run: 0,
        };
        let mut devices = devices(3);
        devices[2].fail_writes = true;

        let runner = SweepRunner::new(&config);
        let started = Instant::now();
        let err = runner
            .run_combination(&mut devices, &combination)
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(err, Error::WorkerIo { worker: 2, .. }));
        assert!(runner.cancel_handle().load(Ordering::Relaxed));
    }

    #[test]
    fn test_preset_abort_flag() {
        let config = config();
        let flag = Arc::new(AtomicBool::new(true));
        let mut devices = devices(1);
        let mut rows = 0;

        let err = SweepRunner::new(&config)
            .with_abort_flag(flag)
            .run(&mut devices, |_| {
                rows += 1;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, Error::Aborted));
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let config = config();
        let combination = combinations(&config)[0];
        let mut devices = devices(2);
        devices[1].panic_on_read = true;

        let err = SweepRunner::new(&config)
            .run_combination(&mut devices, &combination)
            .unwrap_err();
        assert!(matches!(err, Error::WorkerPanicked(1)));
    }

    #[test]
    fn test_no_devices() {
        let config = config();
        let mut devices: Vec<Device> = Vec::new();
        let err = SweepRunner::new(&config)
            .run(&mut devices, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_row_sink_error_stops_sweep() {
        let config = config();
        let mut devices = devices(1);
        let mut calls = 0;

        let err = SweepRunner::new(&config)
            .run(&mut devices, |_| {
                calls += 1;
                Err(Error::Io(std::io::Error::other("stdout closed")))
            })
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, Error::Io(_)));
    }
}
