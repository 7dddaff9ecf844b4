//! Human-readable companion log of an export run

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Local;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only text log: start, totals, table boundaries, throughput, end
pub struct ExportLog<W: Write> {
    out: W,
    started: Instant,
}

impl ExportLog<BufWriter<File>> {
    /// Open (or append to) a log file
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ExportLog<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            started: Instant::now(),
        }
    }

    fn line(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        self.out.write_fmt(args)?;
        self.out.write_all(b"\n")
    }

    pub fn start(&mut self, description: &str) -> io::Result<()> {
        self.started = Instant::now();
        self.line(format_args!("Start: {}", Local::now().format(TIMESTAMP_FORMAT)))?;
        self.line(format_args!("Export: {}", description))
    }

    pub fn total_rows(&mut self, total: Option<u64>) -> io::Result<()> {
        match total {
            Some(total) => self.line(format_args!("Total rows: {}", total)),
            None => self.line(format_args!("Total rows: unknown")),
        }
    }

    pub fn table_started(&mut self, table: &str) -> io::Result<()> {
        self.line(format_args!("Table {}: started", table))
    }

    pub fn table_finished(&mut self, table: &str, rows: u64) -> io::Result<()> {
        self.line(format_args!("Table {}: {} rows", table, rows))
    }

    pub fn cancelled(&mut self) -> io::Result<()> {
        self.line(format_args!("Cancelled"))
    }

    /// Write the closing summary and flush
    pub fn finish(&mut self, exported: u64) -> io::Result<()> {
        let elapsed = self.started.elapsed();
        self.line(format_args!("Exported lines: {}", exported))?;
        self.line(format_args!("Throughput: {:.1} rows/s", throughput(exported, elapsed)))?;
        self.line(format_args!("End: {}", Local::now().format(TIMESTAMP_FORMAT)))?;
        self.line(format_args!("Elapsed: {}", format_elapsed(elapsed)))?;
        self.out.flush()
    }

    /// Record a failure as the final line and flush
    pub fn error(&mut self, error: &dyn fmt::Display) -> io::Result<()> {
        self.line(format_args!("Error: {}", error))?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn throughput(rows: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { rows as f64 / secs } else { rows as f64 }
}

/// `HH:MM:SS.mmm`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_ms = elapsed.as_millis();
    let ms = total_ms % 1000;
    let secs = (total_ms / 1000) % 60;
    let mins = (total_ms / 60_000) % 60;
    let hours = total_ms / 3_600_000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
}
