//! Append-only CSV attendance log.
//!
//! File layout:
//! ```text
//! Name,Timestamp
//! Alice,2024-09-02 08:00:00
//! ```
//! The header row is written once, when the file is missing or empty.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Timestamp format used in the `Timestamp` column (local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const HEADER: [&str; 2] = ["Name", "Timestamp"];

#[derive(Error, Debug)]
pub enum AttendanceLogError {
    #[error("attendance log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("attendance log {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("attendance log {path}: bad timestamp {value:?} on line {line}")]
    BadTimestamp { path: PathBuf, value: String, line: u64 },
}

/// One attendance row. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub name: String,
    pub timestamp: NaiveDateTime,
}

impl LogRecord {
    pub fn new(name: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            name: name.into(),
            timestamp: timestamp.with_nanosecond(0).unwrap_or(timestamp),
        }
    }

    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Destination for attendance records.
pub trait AttendanceSink {
    fn append(&mut self, record: &LogRecord) -> Result<(), AttendanceLogError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

/// CSV file sink. Each append opens, writes and flushes, so a crash never
/// loses rows that were already reported as written.
#[derive(Debug, Clone)]
pub struct CsvAttendanceLog {
    path: PathBuf,
}

impl CsvAttendanceLog {
    /// Create the log (and its header) if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AttendanceLogError> {
        let log = Self { path: path.into() };
        log.open_for_append()?;
        tracing::debug!(path = %log.path.display(), "attendance log ready");
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> AttendanceLogError {
        AttendanceLogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> AttendanceLogError {
        AttendanceLogError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    /// Open for appending, writing the header first if the file is empty.
    fn open_for_append(&self) -> Result<csv::Writer<File>, AttendanceLogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        let empty = file.metadata().map_err(|e| self.io_err(e))?.len() == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if empty {
            writer.write_record(HEADER).map_err(|e| self.csv_err(e))?;
            writer.flush().map_err(|e| self.io_err(e))?;
        }
        Ok(writer)
    }

    /// Read every record back, in file order.
    pub fn read_all(&self) -> Result<Vec<LogRecord>, AttendanceLogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| self.csv_err(e))?;
        let mut records = Vec::new();
        for row in reader.deserialize::<Row>() {
            let row = row.map_err(|e| self.csv_err(e))?;
            let timestamp = NaiveDateTime::parse_from_str(&row.timestamp, TIMESTAMP_FORMAT).map_err(|_| {
                AttendanceLogError::BadTimestamp {
                    path: self.path.clone(),
                    value: row.timestamp.clone(),
                    line: records.len() as u64 + 2,
                }
            })?;
            records.push(LogRecord {
                name: row.name,
                timestamp,
            });
        }
        Ok(records)
    }
}

impl AttendanceSink for CsvAttendanceLog {
    fn append(&mut self, record: &LogRecord) -> Result<(), AttendanceLogError> {
        let mut writer = self.open_for_append()?;
        writer
            .write_record([record.name.as_str(), record.timestamp_string().as_str()])
            .map_err(|e| self.csv_err(e))?;
        writer.flush().map_err(|e| self.io_err(e))?;

        tracing::info!(name = %record.name, timestamp = %record.timestamp_string(), "attendance recorded");
        Ok(())
    }
}
