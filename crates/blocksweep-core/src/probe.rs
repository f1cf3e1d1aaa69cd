//! Device capacity probing.
//!
//! The engine needs two facts about the target filesystem: its native block
//! size (every benchmark block size must be a multiple of it) and its
//! capacity (to turn a filesystem percentage into a file size). Both are read
//! once at startup and treated as immutable afterwards.

use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};

/// Filesystem statistics captured once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    /// Native block size in bytes
    pub block_size: u64,
    /// Unit of the block counts, in bytes
    pub fragment_size: u64,
    /// Total blocks
    pub total_blocks: u64,
    /// Free blocks
    pub free_blocks: u64,
    /// Blocks available to unprivileged users
    pub available_blocks: u64,
}

impl DeviceStats {
    /// Total capacity in bytes
    pub fn total_bytes(&self) -> u64 {
        self.total_blocks.saturating_mul(self.fragment_size)
    }

    /// Available capacity in bytes
    pub fn available_bytes(&self) -> u64 {
        self.available_blocks.saturating_mul(self.fragment_size)
    }
}

impl From<blocksweep_platform::FilesystemStats> for DeviceStats {
    fn from(stats: blocksweep_platform::FilesystemStats) -> Self {
        Self {
            block_size: stats.block_size,
            fragment_size: stats.fragment_size,
            total_blocks: stats.total_blocks,
            free_blocks: stats.free_blocks,
            available_blocks: stats.available_blocks,
        }
    }
}

/// Source of device statistics
pub trait DeviceProbe {
    /// Statistics of the filesystem holding `path`
    fn stats(&self, path: &Path) -> Result<DeviceStats>;
}

/// Probe backed by `statvfs(3)`
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsProbe;

impl DeviceProbe for StatvfsProbe {
    fn stats(&self, path: &Path) -> Result<DeviceStats> {
        let stats = blocksweep_platform::filesystem_stats(path).map_err(|source| Error::Probe {
            path: path.to_path_buf(),
            source,
        })?;
        let stats = DeviceStats::from(stats);
        tracing::info!(
            "Filesystem data: block_size={}, blocks={}, blocks_free={}, blocks_available={}",
            stats.block_size,
            stats.total_blocks,
            stats.free_blocks,
            stats.available_blocks
        );
        Ok(stats)
    }
}

/// Probe returning fixed statistics
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub DeviceStats);

impl DeviceProbe for FixedProbe {
    fn stats(&self, _path: &Path) -> Result<DeviceStats> {
        Ok(self.0)
    }
}
