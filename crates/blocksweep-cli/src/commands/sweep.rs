//! Experiment commands: bench, create, run and remove
//!
//! All four share one path: load settings, apply command-line overrides,
//! probe the target directory, validate, then hand the experiment to the
//! core engine. Result rows go to stdout as soon as each combination ends.

use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use blocksweep_core::units::{KIB, MIB};
use blocksweep_core::{
    file_size_for_percent, format_size, parse_ratio_list, parse_size, parse_size_list, Config,
    DeviceProbe, Error, Experiment, ExperimentMode, RowFormat, RowWriter, SeekPolicy, Settings,
    StatvfsProbe,
};

use crate::progress::{allocation_bar, AllocationProgress};

/// Options describing the worker files
#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct FileArgs {
    /// Directory holding the worker files
    #[arg(short, long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Size of each file (e.g., 100, 512M, 2G); bare numbers are MiB
    #[arg(short = 's', long, value_name = "SIZE")]
    pub file_size: Option<String>,

    /// Size each file as a share of the filesystem (overrides --file-size; 0 leaves it unset)
    #[arg(short = 'p', long, value_name = "PERCENT", value_parser = clap::value_parser!(u32).range(0..=100))]
    pub filesystem_percent: Option<u32>,

    /// Number of files, which is also the number of concurrent workers
    #[arg(short, long, value_name = "N")]
    pub number_of_files: Option<usize>,

    /// Go through the page cache instead of bypassing it
    #[arg(long)]
    pub no_direct_io: bool,
}

impl FileArgs {
    /// Requested share of the filesystem, with 0 meaning none
    pub fn percent(&self) -> Option<u32> {
        self.filesystem_percent.filter(|&p| p > 0)
    }
}

/// Options describing the sweep grid
#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct SweepArgs {
    /// Block sizes to sweep (e.g., 4,64,1M); bare numbers are KiB
    #[arg(short, long, value_name = "SIZES")]
    pub block_size: Option<String>,

    /// Write ratios to sweep, each between 0 and 1 (e.g., 0,0.5,1)
    #[arg(short, long, value_name = "RATIOS")]
    pub write_ratio: Option<String>,

    /// Write ratios for worker 0 only, swept inside --write-ratio
    #[arg(long, value_name = "RATIOS")]
    pub write_ratio_thread0: Option<String>,

    /// Random-access ratios to sweep, each between 0 and 1
    #[arg(short, long, value_name = "RATIOS")]
    pub random_ratio: Option<String>,

    /// Seconds per combination
    #[arg(short, long, value_name = "SECONDS")]
    pub time: Option<u64>,

    /// Repetitions of every combination
    #[arg(long, value_name = "N")]
    pub runs: Option<u32>,

    /// Seek before every sequential access instead of only on wrap
    #[arg(long)]
    pub always_seek: bool,

    /// Emit result rows as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the experiment commands
pub struct ExperimentArgs {
    /// Phases to perform
    pub mode: ExperimentMode,
    /// File options
    pub files: FileArgs,
    /// Sweep options
    pub sweep: SweepArgs,
    /// Custom settings file path
    pub config_file: Option<PathBuf>,
    /// Hide progress and summary
    pub quiet: bool,
    /// Set to stop the workers
    pub cancel_flag: Arc<AtomicBool>,
}

#[derive(Serialize)]
struct ReceivedOptions<'a> {
    mode: ExperimentMode,
    #[serde(flatten)]
    files: &'a FileArgs,
    #[serde(flatten)]
    sweep: &'a SweepArgs,
}

/// Execute an experiment command
pub fn execute(args: ExperimentArgs) -> Result<()> {
    let received = ReceivedOptions {
        mode: args.mode,
        files: &args.files,
        sweep: &args.sweep,
    };
    tracing::info!("Options received: {}", serde_json::to_string(&received)?);

    let settings_path = args.config_file.clone().or_else(Settings::config_path);
    let settings = Settings::load_from_path(settings_path);

    let mut config = build_config(&settings, &args.files, &args.sweep)?;

    let device = StatvfsProbe.stats(&config.directory)?;

    if let Some(percent) = args.files.percent() {
        config.file_size = file_size_for_percent(&device, percent, config.number_of_files)?;
        tracing::info!(
            "{}% of the filesystem gives {} per file",
            percent,
            format_size(config.file_size)
        );
    }

    let experiment = Experiment::new(config, args.mode, device)?;
    tracing::info!(
        "Options processed: {}",
        serde_json::to_string(experiment.config())?
    );

    let format = if args.sweep.json || settings.output.json {
        RowFormat::Json
    } else {
        RowFormat::Csv
    };

    let bar = allocation_bar(experiment.allocation_bytes(), args.quiet)?;
    let progress = AllocationProgress::new(bar, experiment.config().file_size);
    let mut writer = RowWriter::new(std::io::stdout().lock(), format);

    let summary = experiment
        .execute(
            args.cancel_flag,
            |id, written| progress.update(id, written),
            |row| writer.write_row(row),
        )
        .map_err(|e| match e {
            Error::Aborted => anyhow::anyhow!("Cancelled; files were left in place"),
            e => e.into(),
        })?;

    if !args.quiet {
        eprintln!(
            "{} {}: {} files, {} rows in {:.1}s",
            style("✓").green(),
            summary.mode,
            summary.files,
            summary.rows,
            summary.elapsed.as_secs_f64()
        );
    }

    Ok(())
}

/// Settings with command-line overrides applied
pub fn build_config(settings: &Settings, files: &FileArgs, sweep: &SweepArgs) -> Result<Config> {
    if files.directory.is_none() && settings.files.directory.is_none() {
        bail!(
            "No benchmark directory given.\n\
             Use --directory, or set [files] directory in the settings file."
        );
    }

    let mut config = settings
        .to_config(files.directory.clone())
        .context("Invalid settings file")?;

    if let Some(ref size) = files.file_size {
        config.file_size = parse_size(size, MIB).context("Invalid --file-size")?;
    }
    if let Some(count) = files.number_of_files {
        config.number_of_files = count;
    }
    if files.no_direct_io {
        config.direct_io = false;
    }

    if let Some(ref sizes) = sweep.block_size {
        config.block_sizes = parse_size_list(sizes, KIB).context("Invalid --block-size")?;
    }
    if let Some(ref ratios) = sweep.write_ratio {
        config.write_ratios = parse_ratio_list(ratios).context("Invalid --write-ratio")?;
    }
    if let Some(ref ratios) = sweep.write_ratio_thread0 {
        config.write_ratios_thread0 =
            parse_ratio_list(ratios).context("Invalid --write-ratio-thread0")?;
    }
    if let Some(ref ratios) = sweep.random_ratio {
        config.random_ratios = parse_ratio_list(ratios).context("Invalid --random-ratio")?;
    }
    if let Some(secs) = sweep.time {
        config.duration = Duration::from_secs(secs);
    }
    if let Some(runs) = sweep.runs {
        config.runs = runs;
    }
    if sweep.always_seek {
        config.seek_policy = SeekPolicy::Always;
    }

    Ok(config)
}
