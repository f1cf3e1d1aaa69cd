//! Result rows and their output formats.

use std::io::Write;
use std::time::Duration;

use serde::Serialize;

use crate::error::Result;
use crate::sweep::Combination;
use crate::units::KIB;
use crate::worker::ThroughputSample;

/// One line of output: a combination run and its per-worker throughputs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    /// Wall time since the experiment started
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Block size in bytes
    pub block_size: u64,
    /// Random-access ratio
    pub random_ratio: f64,
    /// Write ratio of worker 0
    pub write_ratio_thread0: f64,
    /// Write ratio of the other workers
    pub write_ratio: f64,
    /// Repetition index
    pub run: u32,
    /// Sum of worker throughputs in KiB/s
    pub total_kib: f64,
    /// Throughput of each worker in KiB/s, ordered by worker id
    pub workers_kib: Vec<f64>,
}

fn serialize_secs<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

impl ResultRow {
    /// Aggregate the samples of one combination run
    ///
    /// `samples` must be ordered by worker id.
    pub fn new(elapsed: Duration, combination: &Combination, samples: &[ThroughputSample]) -> Self {
        let workers_kib: Vec<f64> = samples.iter().map(|s| s.throughput_kib).collect();
        Self {
            elapsed,
            block_size: combination.block_size,
            random_ratio: combination.random_ratio,
            write_ratio_thread0: combination.write_ratio_thread0,
            write_ratio: combination.write_ratio,
            run: combination.run,
            total_kib: workers_kib.iter().sum(),
            workers_kib,
        }
    }
}

/// Comma-separated line: elapsed, block size (KiB), random ratio, thread-0
/// write ratio, write ratio, total, then each worker
impl std::fmt::Display for ResultRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2}, {}, {:.1}, {:.1}, {:.1}, {:.0}",
            self.elapsed.as_secs_f64(),
            self.block_size / KIB,
            self.random_ratio,
            self.write_ratio_thread0,
            self.write_ratio,
            self.total_kib
        )?;
        for worker in &self.workers_kib {
            write!(f, ", {:.0}", worker)?;
        }
        Ok(())
    }
}

/// Output format for result rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowFormat {
    /// Comma-separated text
    #[default]
    Csv,
    /// One JSON object per line
    Json,
}

/// Writes result rows as they are produced
pub struct RowWriter<W: Write> {
    out: W,
    format: RowFormat,
}

impl<W: Write> RowWriter<W> {
    /// Create a writer emitting `format` to `out`
    pub fn new(out: W, format: RowFormat) -> Self {
        Self { out, format }
    }

    /// Write one row and flush it
    pub fn write_row(&mut self, row: &ResultRow) -> Result<()> {
        match self.format {
            RowFormat::Csv => writeln!(self.out, "{}", row)?,
            RowFormat::Json => {
                serde_json::to_writer(&mut self.out, row).map_err(std::io::Error::from)?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::AccessParams;

    fn sample(worker: usize, throughput_kib: f64) -> ThroughputSample {
        ThroughputSample {
            worker,
            params: AccessParams {
                block_size: 4 * KIB,
                write_ratio: 0.0,
                random_ratio: 0.5,
            },
            reads: 10,
            writes: 0,
            seeks: 1,
            bytes: 40 * KIB,
            elapsed: Duration::from_secs(1),
            throughput_kib,
        }
    }

    fn combination() -> Combination {
        Combination {
            write_ratio: 0.2,
            write_ratio_thread0: 1.0,
            random_ratio: 0.5,
            block_size: 4 * KIB,
            run: 0,
        }
    }

    #[test]
    fn test_row_aggregates_in_worker_order() {
        let samples = vec![sample(0, 100.0), sample(1, 250.5), sample(2, 49.5)];
        let row = ResultRow::new(Duration::from_millis(5250), &combination(), &samples);

        assert_eq!(row.workers_kib, vec![100.0, 250.5, 49.5]);
        assert!((row.total_kib - 400.0).abs() < 1e-9);
        assert_eq!(row.block_size, 4 * KIB);
        assert_eq!(row.write_ratio_thread0, 1.0);
    }

    #[test]
    fn test_row_csv_line() {
        let samples = vec![sample(0, 1000.0), sample(1, 2000.0)];
        let row = ResultRow::new(Duration::from_millis(7010), &combination(), &samples);
        assert_eq!(row.to_string(), "7.01, 4, 0.5, 1.0, 0.2, 3000, 1000, 2000");
    }

    #[test]
    fn test_row_writer_csv() {
        let row = ResultRow::new(Duration::from_secs(1), &combination(), &[sample(0, 10.0)]);
        let mut writer = RowWriter::new(Vec::new(), RowFormat::Csv);
        writer.write_row(&row).unwrap();
        writer.write_row(&row).unwrap();

        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 2);
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn test_row_writer_json() {
        let row = ResultRow::new(Duration::from_secs(2), &combination(), &[sample(0, 10.0)]);
        let mut writer = RowWriter::new(Vec::new(), RowFormat::Json);
        writer.write_row(&row).unwrap();

        let out = String::from_utf8(writer.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["elapsed_secs"], serde_json::json!(2.0));
        assert_eq!(value["block_size"], serde_json::json!(4096));
        assert_eq!(value["workers_kib"], serde_json::json!([10.0]));
    }
}
