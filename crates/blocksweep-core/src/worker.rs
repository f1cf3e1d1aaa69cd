//! Timed access loop run by one worker against one file.
//!
//! Each iteration makes two independent random decisions: whether to jump to
//! a uniformly chosen block or continue sequentially, and whether to write or
//! read that block. The loop runs until the configured duration has elapsed;
//! the clock is only consulted once per batch of [`BATCH_SIZE`] iterations.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use blocksweep_platform::AlignedBuffer;
use rand::{Rng, RngCore};
use serde::Serialize;

use crate::config::SeekPolicy;
use crate::error::{Error, IoOp, Result};
use crate::file::BUFFER_ALIGNMENT;
use crate::units::KIB;

/// Iterations between two deadline checks
pub const BATCH_SIZE: u32 = 100;

/// Access pattern of one worker for one combination
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccessParams {
    /// Block size in bytes
    pub block_size: u64,
    /// Probability that an access is a write
    pub write_ratio: f64,
    /// Probability that an access jumps to a random block
    pub random_ratio: f64,
}

/// One worker's measurement for one combination run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputSample {
    /// Worker ordinal
    pub worker: usize,
    /// Access pattern that produced this sample
    pub params: AccessParams,
    /// Blocks read
    pub reads: u64,
    /// Blocks written
    pub writes: u64,
    /// Explicit repositions of the file offset
    pub seeks: u64,
    /// Bytes transferred
    pub bytes: u64,
    /// Time spent in the loop
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Throughput in KiB/s
    pub throughput_kib: f64,
}

impl ThroughputSample {
    /// Total read and write operations
    pub fn operations(&self) -> u64 {
        self.reads + self.writes
    }
}

fn serialize_secs<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Throughput in KiB/s of `operations` accesses of `block_size` bytes in `elapsed`
pub fn throughput_kib_per_sec(operations: u64, block_size: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (operations as f64 * block_size as f64) / KIB as f64 / secs
    } else {
        0.0
    }
}

/// Runs the timed access loop for one worker
#[derive(Debug, Clone)]
pub struct AccessWorker {
    id: usize,
    file_blocks: u64,
    params: AccessParams,
    duration: Duration,
    seek_policy: SeekPolicy,
    abort_flag: Arc<AtomicBool>,
}

impl AccessWorker {
    /// Create a worker over a file of `file_size` bytes
    pub fn new(id: usize, file_size: u64, params: AccessParams, duration: Duration) -> Self {
        let file_blocks = if params.block_size > 0 {
            file_size / params.block_size
        } else {
            0
        };
        Self {
            id,
            file_blocks,
            params,
            duration,
            seek_policy: SeekPolicy::default(),
            abort_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the sequential repositioning policy
    pub fn seek_policy(mut self, policy: SeekPolicy) -> Self {
        self.seek_policy = policy;
        self
    }

    /// Share an abort flag, checked once per batch
    pub fn abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort_flag = flag;
        self
    }

    /// Number of blocks in the file
    pub fn file_blocks(&self) -> u64 {
        self.file_blocks
    }

    /// Run the loop with the thread-local random generator
    pub fn run<D>(&self, device: &mut D) -> Result<ThroughputSample>
    where
        D: Read + Write + Seek,
    {
        self.run_with_rng(device, &mut rand::rng())
    }

    /// Run the loop drawing every decision from `rng`
    pub fn run_with_rng<D, R>(&self, device: &mut D, rng: &mut R) -> Result<ThroughputSample>
    where
        D: Read + Write + Seek,
        R: Rng,
    {
        if self.file_blocks == 0 {
            return Err(Error::InvalidConfig(format!(
                "worker {}: block size {} leaves no whole block in the file",
                self.id, self.params.block_size
            )));
        }

        let block_size = self.params.block_size;
        let mut write_buffer = AlignedBuffer::new(block_size as usize, BUFFER_ALIGNMENT);
        RngCore::fill_bytes(rng, write_buffer.as_mut_slice());
        let mut read_buffer = AlignedBuffer::new(block_size as usize, BUFFER_ALIGNMENT);

        let random_threshold = self.params.random_ratio * 100.0;
        let always_seek = self.seek_policy == SeekPolicy::Always;

        tracing::debug!(
            "worker {}: main loop, block_size={}, write_ratio={:.1}, random_ratio={:.1}",
            self.id,
            block_size,
            self.params.write_ratio,
            self.params.random_ratio
        );

        let mut counters = Counters::default();
        let mut cursor: u64 = 0;
        self.seek(device, 0, &mut counters)?;

        let start = Instant::now();
        while start.elapsed() < self.duration {
            if self.abort_flag.load(Ordering::Relaxed) {
                return Err(Error::Aborted);
            }

            for _ in 0..BATCH_SIZE {
                if f64::from(rng.random_range(0..100u32)) < random_threshold {
                    cursor = rng.random_range(0..self.file_blocks);
                    self.seek(device, cursor * block_size, &mut counters)?;
                } else {
                    cursor += 1;
                    if cursor == self.file_blocks {
                        cursor = 0;
                    }
                    if cursor == 0 || always_seek {
                        self.seek(device, cursor * block_size, &mut counters)?;
                    }
                }

                if rng.random::<f64>() < self.params.write_ratio {
                    device
                        .write_all(write_buffer.as_slice())
                        .map_err(|e| self.io_error(IoOp::Write, e))?;
                    counters.writes += 1;
                } else {
                    device
                        .read_exact(read_buffer.as_mut_slice())
                        .map_err(|e| self.io_error(IoOp::Read, e))?;
                    counters.reads += 1;
                }
            }
        }
        let elapsed = start.elapsed();

        let operations = counters.reads + counters.writes;
        let throughput_kib = throughput_kib_per_sec(operations, block_size, elapsed);
        tracing::debug!(
            "worker {}: count={}, time={:.1}, throughput={:.0}",
            self.id,
            operations,
            elapsed.as_secs_f64(),
            throughput_kib
        );

        Ok(ThroughputSample {
            worker: self.id,
            params: self.params,
            reads: counters.reads,
            writes: counters.writes,
            seeks: counters.seeks,
            bytes: operations * block_size,
            elapsed,
            throughput_kib,
        })
    }

    fn seek<D: Seek>(&self, device: &mut D, offset: u64, counters: &mut Counters) -> Result<()> {
        device
            .seek(SeekFrom::Start(offset))
            .map_err(|e| self.io_error(IoOp::Seek, e))?;
        counters.seeks += 1;
        Ok(())
    }

    fn io_error(&self, op: IoOp, source: std::io::Error) -> Error {
        Error::WorkerIo {
            worker: self.id,
            op,
            source,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    reads: u64,
    writes: u64,
    seeks: u64,
}
