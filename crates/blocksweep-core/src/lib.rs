//! # Blocksweep Core
//!
//! Benchmark engine for the Blocksweep storage micro-benchmark.
//!
//! ## Modules
//!
//! - `probe`: Filesystem block size and capacity
//! - `config`: Experiment configuration and validation
//! - `file`: Worker file allocation, attachment and release
//! - `worker`: The timed random/sequential, read/write access loop
//! - `sweep`: Parameter grid and concurrent fan-out per combination
//! - `report`: Result rows and their output formats
//! - `experiment`: Mode-driven setup, sweep and teardown
//! - `settings`: Persistent user settings from configuration file
//! - `units`: Size and ratio parsing
//! - `error`: Error types and result aliases
//!
//! ## Example
//!
//! ```ignore
//! use blocksweep_core::{Config, Experiment, ExperimentMode, StatvfsProbe};
//! use std::sync::{atomic::AtomicBool, Arc};
//!
//! let config = Config::new("/mnt/scratch")
//!     .block_sizes(vec![4096, 1024 * 1024])
//!     .write_ratios(vec![0.0, 1.0]);
//!
//! let experiment = Experiment::probe(config, ExperimentMode::CreateAndRun, &StatvfsProbe)?;
//! experiment.execute(Arc::new(AtomicBool::new(false)), |_, _| {}, |row| {
//!     println!("{}", row);
//!     Ok(())
//! })?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod experiment;
pub mod file;
pub mod probe;
pub mod report;
pub mod settings;
pub mod sweep;
pub mod units;
pub mod worker;

pub use config::{file_size_for_percent, Config, ExperimentMode, SeekPolicy};
pub use error::{Error, FaultClass, IoOp, Result};
pub use experiment::{Experiment, ExperimentSummary};
pub use file::WorkerFile;
pub use probe::{DeviceProbe, DeviceStats, FixedProbe, StatvfsProbe};
pub use report::{ResultRow, RowFormat, RowWriter};
pub use settings::{FileSettings, OutputSettings, Settings, SettingsError, SweepSettings};
pub use sweep::{combinations, Combination, SweepRunner};
pub use units::{
    format_size, format_throughput, parse_ratio_list, parse_size, parse_size_list, ParseError,
};
pub use worker::{throughput_kib_per_sec, AccessParams, AccessWorker, ThroughputSample};
