// src/record_store.rs
//
// Per-day output layout:
//
//   <root>/<YYYY-MM-DD>/<YYYY-MM-DD>.csv          one row per event
//   <root>/<YYYY-MM-DD>/<text>_<HH-MM-SS-mmm>.jpg  plate crops

use crate::interface::RecordStore;
use crate::types::EventRecord;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Output directory and date stamp for one run. The date is fixed at startup,
/// so a run that crosses midnight keeps writing into the day it started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutput {
    pub dir: PathBuf,
    pub date: String,
}

impl SessionOutput {
    pub fn prepare(root: &Path, date: &NaiveDate) -> Result<Self> {
        let date = date.format("%Y-%m-%d").to_string();
        let dir = root.join(&date);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        info!("💾 Output directory: {}", dir.display());
        Ok(Self { dir, date })
    }

    pub fn records_path(&self) -> PathBuf {
        self.dir.join(format!("{}.csv", self.date))
    }
}

/// Append-only CSV event log. Reopening an existing file for the same day
/// keeps its rows; the header is only written into a new or empty file.
pub struct CsvRecordStore {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows_written: usize,
}

impl CsvRecordStore {
    pub fn open(path: &Path) -> Result<Self> {
        let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open record file {}", path.display()))?;

        let writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);

        info!(
            "✓ Record store ready: {} ({})",
            path.display(),
            if needs_header { "new" } else { "appending" }
        );

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows_written: 0,
        })
    }
}

impl RecordStore for CsvRecordStore {
    fn append(&mut self, record: &EventRecord) -> Result<()> {
        self.writer
            .serialize(record)
            .with_context(|| format!("Failed to write row to {}", self.path.display()))?;
        // Flush per row so a crash never loses an event whose track is
        // already in the ledger.
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        self.rows_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        info!(
            "💾 {} event(s) written to {}",
            self.rows_written,
            self.path.display()
        );
        Ok(())
    }
}

impl Drop for CsvRecordStore {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush {} on drop: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, time: &str) -> EventRecord {
        EventRecord {
            text: text.to_string(),
            date: "2024-05-01".to_string(),
            time: time.to_string(),
        }
    }

    #[test]
    fn test_session_output_layout() {
        let root = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let session = SessionOutput::prepare(root.path(), &date).unwrap();

        assert_eq!(session.date, "2024-05-01");
        assert!(session.dir.is_dir());
        assert_eq!(
            session.records_path(),
            root.path().join("2024-05-01").join("2024-05-01.csv")
        );
    }

    #[test]
    fn test_new_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");

        let mut store = CsvRecordStore::open(&path).unwrap();
        store.append(&record("KA01AB1234", "14-03-22-123")).unwrap();
        store.append(&record("NO_PLATE_DETECTED", "14-03-25-001")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Number Plate,Date,Time\n\
             KA01AB1234,2024-05-01,14-03-22-123\n\
             NO_PLATE_DETECTED,2024-05-01,14-03-25-001\n"
        );
        assert_eq!(store.rows_written, 2);
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");

        {
            let mut store = CsvRecordStore::open(&path).unwrap();
            store.append(&record("KA01", "10-00-00-000")).unwrap();
        }
        {
            let mut store = CsvRecordStore::open(&path).unwrap();
            store.append(&record("KA02", "11-00-00-000")).unwrap();
            store.flush().unwrap();
        }

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<EventRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(
            rows,
            vec![record("KA01", "10-00-00-000"), record("KA02", "11-00-00-000")]
        );
    }

    #[test]
    fn test_rows_are_durable_before_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");

        let mut store = CsvRecordStore::open(&path).unwrap();
        store.append(&record("KA01", "10-00-00-000")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("KA01"));
        drop(store);
    }

    #[test]
    fn test_text_with_comma_is_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");

        let mut store = CsvRecordStore::open(&path).unwrap();
        store.append(&record("KA,01", "10-00-00-000")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"KA,01\""));
    }
}
