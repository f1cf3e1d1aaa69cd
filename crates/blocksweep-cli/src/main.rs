//! Blocksweep - a storage micro-benchmark
//!
//! # Usage
//!
//! ```bash
//! # Full sweep: create files, run every combination, remove files
//! blocksweep bench -d /mnt/scratch --file-size 1G --number-of-files 2
//!
//! # Compare block sizes with pure random reads
//! blocksweep bench -d /mnt/scratch -b 4,64,1M -w 0 -r 1
//!
//! # Keep files around between sweeps
//! blocksweep create -d /mnt/scratch
//! blocksweep run -d /mnt/scratch --write-ratio 0,1
//! blocksweep remove -d /mnt/scratch
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use console::style;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use blocksweep_core::ExperimentMode;

mod commands;
mod progress;

use commands::sweep::{ExperimentArgs, FileArgs, SweepArgs};

/// Blocksweep - storage throughput across block sizes, read/write mixes and access patterns
#[derive(Parser)]
#[command(name = "blocksweep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress everything except result rows and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Settings file to use instead of the default location
    #[arg(long, global = true, value_name = "FILE", env = "BLOCKSWEEP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the files, run the sweep, then remove the files
    Bench {
        #[command(flatten)]
        files: FileArgs,

        #[command(flatten)]
        sweep: SweepArgs,
    },

    /// Create and fill the files, and keep them
    Create {
        #[command(flatten)]
        files: FileArgs,
    },

    /// Run the sweep against files left by a previous create
    Run {
        #[command(flatten)]
        files: FileArgs,

        #[command(flatten)]
        sweep: SweepArgs,
    },

    /// Remove files left by a previous create
    Remove {
        #[command(flatten)]
        files: FileArgs,
    },

    /// Show or initialize the settings file
    Config {
        /// Create a settings file with default values
        #[arg(long)]
        init: bool,

        /// Print the settings file path
        #[arg(long)]
        path: bool,

        /// Output settings as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{} {}", style("Error:").red().bold(), panic_info);
    }));

    if let Err(e) = run() {
        eprintln!("{} {}", style("Error:").red().bold(), e);

        // Show cause chain in verbose mode
        if std::env::var("RUST_BACKTRACE").is_ok() {
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  {} {}", style("Caused by:").yellow(), cause);
                source = cause.source();
            }
        }

        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only result rows
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if cli.quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // First Ctrl+C stops the workers at their next batch, second one exits
    let abort = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&abort);
    let quiet = cli.quiet;
    ctrlc::set_handler(move || {
        if flag.load(Ordering::SeqCst) {
            if !quiet {
                eprintln!("\n{}", style("Forced exit").red().bold());
            }
            std::process::exit(130);
        }
        flag.store(true, Ordering::SeqCst);
        if !quiet {
            eprintln!(
                "\n{}",
                style("Stopping workers... Press Ctrl+C again to force exit").yellow()
            );
        }
    })?;

    let experiment = |mode, files, sweep| {
        commands::sweep::execute(ExperimentArgs {
            mode,
            files,
            sweep,
            config_file: cli.config.clone(),
            quiet,
            cancel_flag: Arc::clone(&abort),
        })
    };

    match cli.command {
        Commands::Bench { files, sweep } => experiment(ExperimentMode::CreateAndRun, files, sweep),
        Commands::Create { files } => {
            experiment(ExperimentMode::Create, files, SweepArgs::default())
        }
        Commands::Run { files, sweep } => experiment(ExperimentMode::Run, files, sweep),
        Commands::Remove { files } => {
            experiment(ExperimentMode::Remove, files, SweepArgs::default())
        }
        Commands::Config { init, path, json } => {
            commands::config::execute(commands::config::ConfigArgs {
                init,
                path,
                json,
                quiet,
                config_file: cli.config.clone(),
            })
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}
