//! Settings file management command

use anyhow::{Context, Result};
use blocksweep_core::units::MIB;
use blocksweep_core::{format_size, parse_size, Settings};
use console::style;
use std::path::PathBuf;

/// Arguments for the config command
pub struct ConfigArgs {
    /// Initialize a new settings file with defaults
    pub init: bool,
    /// Show the path to the settings file
    pub path: bool,
    /// Show settings in JSON format
    pub json: bool,
    /// Suppress output
    pub quiet: bool,
    /// Custom settings file path (overrides default)
    pub config_file: Option<PathBuf>,
}

/// Execute the config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    let config_path = args.config_file.clone().or_else(Settings::config_path);

    if args.path {
        if let Some(path) = &config_path {
            println!("{}", path.display());
        } else if !args.quiet {
            eprintln!("{}", style("Could not determine config path").yellow());
        }
        return Ok(());
    }

    if args.init {
        return init_config(config_path, args.quiet);
    }

    show_config(config_path, args.json)
}

/// Initialize a new settings file with default values
fn init_config(config_path: Option<PathBuf>, quiet: bool) -> Result<()> {
    let path = config_path.context("Could not determine configuration directory")?;

    if path.exists() {
        if !quiet {
            eprintln!(
                "{} Settings file already exists at: {}",
                style("Warning:").yellow(),
                path.display()
            );
            eprintln!("Use a text editor to modify it, or delete it to re-initialize.");
        }
        return Ok(());
    }

    let saved_path = Settings::default()
        .save_to_path(Some(path))
        .context("Failed to save settings file")?;

    if !quiet {
        println!(
            "{} Created settings file at: {}",
            style("Success:").green(),
            saved_path.display()
        );
        println!();
        println!("Example settings:");
        println!();
        println!("  [files]");
        println!("  directory = \"/mnt/scratch\"   # Used when --directory is omitted");
        println!("  number_of_files = 4");
        println!();
        println!("  [sweep]");
        println!("  block_sizes = [\"4K\", \"1M\"]");
        println!("  random_ratios = [0.0, 1.0]");
    }

    Ok(())
}

/// Show the current settings
fn show_config(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let settings = Settings::load_from_path(config_path.clone());

    if json {
        let json_output = serde_json::to_string_pretty(&settings)
            .context("Failed to serialize settings to JSON")?;
        println!("{}", json_output);
        return Ok(());
    }

    println!("{}", style("Blocksweep Settings").bold());
    println!();

    if let Some(path) = &config_path {
        if config_exists {
            println!("  {} {}", style("Config file:").dim(), path.display());
        } else {
            println!(
                "  {} {} {}",
                style("Config file:").dim(),
                path.display(),
                style("(not found, using defaults)").yellow()
            );
        }
    }
    println!();

    println!("{}", style("[files]").cyan());
    match &settings.files.directory {
        Some(dir) => println!("  directory = \"{}\"", dir.display()),
        None => println!("  directory = {}", style("(unset)").dim()),
    }
    println!(
        "  file_size = \"{}\"  {}",
        settings.files.file_size,
        describe_size(&settings.files.file_size, MIB)
    );
    println!("  number_of_files = {}", settings.files.number_of_files);
    println!("  direct_io = {}", settings.files.direct_io);
    println!();

    println!("{}", style("[sweep]").cyan());
    let blocks: Vec<String> = settings
        .sweep
        .block_sizes
        .iter()
        .map(|s| format!("\"{}\"", s))
        .collect();
    println!("  block_sizes = [{}]", blocks.join(", "));
    println!("  write_ratios = {:?}", settings.sweep.write_ratios);
    println!(
        "  write_ratios_thread0 = {:?}",
        settings.sweep.write_ratios_thread0
    );
    println!("  random_ratios = {:?}", settings.sweep.random_ratios);
    println!("  time = {}", settings.sweep.time);
    println!("  runs = {}", settings.sweep.runs);
    println!("  always_seek = {}", settings.sweep.always_seek);
    println!();

    println!("{}", style("[output]").cyan());
    println!("  json = {}", settings.output.json);

    if !config_exists {
        println!();
        println!(
            "{}",
            style("Run 'blocksweep config --init' to create a settings file.").dim()
        );
    }

    Ok(())
}

/// Parsed size as a dim annotation, or a warning when it does not parse
fn describe_size(value: &str, default_unit: u64) -> String {
    match parse_size(value, default_unit) {
        Ok(bytes) => style(format!("# {}", format_size(bytes))).dim().to_string(),
        Err(e) => style(format!("# {}", e)).red().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksweep_core::units::KIB;
    use tempfile::TempDir;

    #[test]
    fn test_describe_size() {
        assert!(describe_size("100M", MIB).contains("100 MiB"));
        assert!(describe_size("64", KIB).contains("64 KiB"));
        assert!(describe_size("lots", MIB).contains("Invalid size"));
    }

    #[test]
    fn test_init_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("blocksweep.toml");

        init_config(Some(path.clone()), true).unwrap();
        assert!(path.exists());
        let loaded = Settings::load_from_path(Some(path));
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_init_keeps_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blocksweep.toml");
        std::fs::write(&path, "[sweep]\nruns = 9\n").unwrap();

        init_config(Some(path.clone()), true).unwrap();
        assert_eq!(Settings::load_from_path(Some(path)).sweep.runs, 9);
    }

    #[test]
    fn test_init_without_path() {
        assert!(init_config(None, true).is_err());
    }

    #[test]
    fn test_show_config_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.toml");
        assert!(show_config(Some(path.clone()), false).is_ok());
        assert!(show_config(Some(path), true).is_ok());
    }
}
