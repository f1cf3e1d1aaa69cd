//! Persistent user settings for Blocksweep
//!
//! Settings are stored in a TOML configuration file at:
//! - Linux: `~/.config/blocksweep/blocksweep.toml`
//! - macOS: `~/Library/Application Support/blocksweep/blocksweep.toml`
//!
//! Every value is a default that command-line flags override.
//!
//! # Example Configuration
//!
//! ```toml
//! [files]
//! directory = "/mnt/scratch"
//! file_size = "100M"
//! number_of_files = 2
//! direct_io = true
//!
//! [sweep]
//! block_sizes = ["4K", "64K", "1M"]
//! write_ratios = [0.0, 0.5, 1.0]
//! write_ratios_thread0 = []
//! random_ratios = [0.0, 1.0]
//! time = 7
//! runs = 1
//! always_seek = false
//!
//! [output]
//! json = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    Config, SeekPolicy, DEFAULT_BLOCK_SIZE, DEFAULT_DURATION, DEFAULT_FILE_SIZE, DEFAULT_RATIOS,
};
use crate::units::{format_size, parse_size, ParseError, KIB, MIB};

/// Configuration file name
const CONFIG_FILE_NAME: &str = "blocksweep.toml";

/// Application name for config directory
const APP_NAME: &str = "blocksweep";

/// User settings loaded from configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Worker file settings
    pub files: FileSettings,

    /// Sweep grid settings
    pub sweep: SweepSettings,

    /// Result output settings
    pub output: OutputSettings,
}

/// Settings for the worker files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileSettings {
    /// Directory holding the files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Size of each file (e.g., "100M", "1G"); bare numbers are MiB
    pub file_size: String,

    /// Number of files and workers
    pub number_of_files: usize,

    /// Bypass the page cache
    pub direct_io: bool,
}

/// Settings for the sweep grid
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepSettings {
    /// Block sizes (e.g., "4K", "1M"); bare numbers are KiB
    pub block_sizes: Vec<String>,

    /// Write ratios
    pub write_ratios: Vec<f64>,

    /// Write ratios for worker 0; empty follows `write_ratios`
    pub write_ratios_thread0: Vec<f64>,

    /// Random-access ratios
    pub random_ratios: Vec<f64>,

    /// Seconds per combination
    pub time: u64,

    /// Repetitions of every combination
    pub runs: u32,

    /// Seek before every sequential access
    pub always_seek: bool,
}

/// Settings for result output
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputSettings {
    /// Emit rows as JSON objects
    pub json: bool,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            directory: None,
            file_size: format!("{}M", DEFAULT_FILE_SIZE / MIB),
            number_of_files: 1,
            direct_io: true,
        }
    }
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            block_sizes: vec![format!("{}M", DEFAULT_BLOCK_SIZE / MIB)],
            write_ratios: DEFAULT_RATIOS.to_vec(),
            write_ratios_thread0: Vec::new(),
            random_ratios: DEFAULT_RATIOS.to_vec(),
            time: DEFAULT_DURATION.as_secs(),
            runs: 1,
            always_seek: false,
        }
    }
}

impl Settings {
    /// Load settings from the configuration file
    ///
    /// Returns default settings if the file doesn't exist or can't be parsed
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No config path available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => {
                    tracing::debug!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save settings to the configuration file
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        self.save_to_path(Self::config_path())
    }

    /// Save settings to a specific path
    pub fn save_to_path(&self, path: Option<PathBuf>) -> Result<PathBuf, SettingsError> {
        let path = path.ok_or(SettingsError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(self).map_err(SettingsError::Serialize)?;

        std::fs::write(&path, contents).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!("Saved settings to {:?}", path);
        Ok(path)
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE_NAME))
    }

    /// Get the path to the configuration directory
    pub fn config_dir() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_NAME))
    }

    /// Check if a configuration file exists
    pub fn config_exists() -> bool {
        Self::config_path().is_some_and(|p| p.exists())
    }

    /// Generate a default configuration file content as a string
    pub fn default_config_string() -> String {
        let default = Self::default();
        toml::to_string_pretty(&default)
            .unwrap_or_else(|_| String::from("# Failed to generate default config"))
    }

    /// Experiment configuration described by these settings
    ///
    /// `directory`, when given, replaces the one in the settings. Size strings are
    /// parsed here; range checks are left to [`Config::validate`].
    pub fn to_config(&self, directory: Option<PathBuf>) -> Result<Config, SettingsError> {
        let file_size = parse_size(&self.files.file_size, MIB).map_err(|source| {
            SettingsError::InvalidValue {
                key: "files.file_size",
                source,
            }
        })?;

        let block_sizes = self
            .sweep
            .block_sizes
            .iter()
            .map(|s| parse_size(s, KIB))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| SettingsError::InvalidValue {
                key: "sweep.block_sizes",
                source,
            })?;

        let directory = directory
            .or_else(|| self.files.directory.clone())
            .unwrap_or_else(|| PathBuf::from("."));

        let seek_policy = if self.sweep.always_seek {
            SeekPolicy::Always
        } else {
            SeekPolicy::OnWrap
        };

        tracing::debug!(
            "Settings describe {} files of {} in {}",
            self.files.number_of_files,
            format_size(file_size),
            directory.display()
        );

        Ok(Config::new(directory)
            .file_size(file_size)
            .number_of_files(self.files.number_of_files)
            .direct_io(self.files.direct_io)
            .block_sizes(block_sizes)
            .write_ratios(self.sweep.write_ratios.clone())
            .write_ratios_thread0(self.sweep.write_ratios_thread0.clone())
            .random_ratios(self.sweep.random_ratios.clone())
            .duration(Duration::from_secs(self.sweep.time))
            .runs(self.sweep.runs)
            .seek_policy(seek_policy))
    }
}

/// Errors that can occur when working with settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// No configuration directory available
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// Failed to read or write config file
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path that caused the error
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Failed to serialize settings
    #[error("Failed to serialize settings: {0}")]
    Serialize(toml::ser::Error),

    /// A setting holds a value that cannot be parsed
    #[error("Invalid value for {key}: {source}")]
    InvalidValue {
        /// Dotted key of the setting
        key: &'static str,
        /// The parse failure
        source: ParseError,
    },
}
