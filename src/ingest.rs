//! # Log Ingestion Helpers
//!
//! Synthetic log generation and CSV file I/O for feeding the indexing
//! layer. The storage core never reads these files; this module exists so
//! the engine can be exercised end-to-end with realistic input.
//!
//! Generated workloads cycle through a small set of resources so that the
//! same key is updated repeatedly, which is what drives copy-on-write
//! versioning in the tree above.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use eyre::{Result, WrapErr};
use tracing::{debug, warn};

use crate::record::LogRecord;

/// Number of distinct resources a synthetic workload cycles through.
const SYNTHETIC_RESOURCE_CYCLE: i64 = 50;

const SYNTHETIC_EVENTS: [&str; 6] = ["START", "STOP", "RESTART", "ERROR", "WARNING", "DEPLOY"];

/// Generates `count` synthetic records starting at `base_timestamp_ms`,
/// spaced `time_step_ms` apart. Resource IDs cycle through a window of
/// [`SYNTHETIC_RESOURCE_CYCLE`] resources beginning at `start_resource_id`
/// so later records update earlier keys' resources.
pub fn generate_synthetic(
    base_timestamp_ms: i64,
    count: usize,
    start_resource_id: i64,
    time_step_ms: i64,
) -> Vec<LogRecord> {
    let mut records = Vec::with_capacity(count);

    for i in 0..count as i64 {
        let slot = i % SYNTHETIC_RESOURCE_CYCLE;
        records.push(LogRecord::new(
            base_timestamp_ms + i * time_step_ms,
            start_resource_id + slot,
            format!("vm-node-{}", slot),
            SYNTHETIC_EVENTS[(i % SYNTHETIC_EVENTS.len() as i64) as usize],
        ));
    }

    records
}

/// Writes records to `path` as CSV, one line per record.
pub fn write_csv(records: &[LogRecord], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .wrap_err_with(|| format!("failed to create log file '{}'", path.display()))?;
    let mut out = BufWriter::new(file);

    for record in records {
        writeln!(out, "{}", record.to_line())
            .wrap_err_with(|| format!("failed to write log file '{}'", path.display()))?;
    }
    out.flush()
        .wrap_err_with(|| format!("failed to flush log file '{}'", path.display()))?;

    debug!(count = records.len(), path = %path.display(), "wrote log file");
    Ok(())
}

/// Reads records from a CSV file. Lines that fail to parse are skipped
/// with a warning; a corrupt line does not abort the load.
pub fn read_csv(path: impl AsRef<Path>) -> Result<Vec<LogRecord>> {
    let path = path.as_ref();
    let file = File::open(path)
        .wrap_err_with(|| format!("failed to open log file '{}'", path.display()))?;

    let mut records = Vec::new();
    for (line_number, line) in BufReader::new(file).lines().enumerate() {
        let line =
            line.wrap_err_with(|| format!("failed to read log file '{}'", path.display()))?;
        if line.is_empty() {
            continue;
        }
        match LogRecord::parse_line(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(line = line_number + 1, error = %e, "skipping unparseable log line");
            }
        }
    }

    debug!(count = records.len(), path = %path.display(), "loaded log file");
    Ok(records)
}
