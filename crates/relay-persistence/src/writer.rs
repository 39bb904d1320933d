//! JSON Lines file writer for execution attempt records.
//!
//! Uses JSON Lines format (.jsonl) for robustness:
//! - Each line is a complete JSON object
//! - Partial file corruption only affects individual lines
//! - Can be read even if a write was interrupted

use crate::error::PersistenceResult;
use chrono::Utc;
use relay_core::ExecutionAttempt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use tracing::{debug, info, warn};

/// Active writer state for the daily file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// JSON Lines writer for execution attempt records.
///
/// Opens daily files in append mode, so interrupted runs never truncate
/// existing audit data.
pub struct JsonLinesWriter {
    /// Base directory for output files.
    base_dir: String,
    /// Buffer of pending records.
    buffer: Vec<ExecutionAttempt>,
    /// Maximum buffer size before flush.
    max_buffer_size: usize,
    /// Active writer (open until date rotation).
    active_writer: Option<ActiveWriter>,
}

impl JsonLinesWriter {
    /// Create a new JSON Lines writer.
    pub fn new(base_dir: &str, max_buffer_size: usize) -> Self {
        if let Err(e) = std::fs::create_dir_all(base_dir) {
            warn!(?e, "Failed to create directory: {}", base_dir);
        }

        Self {
            base_dir: base_dir.to_string(),
            buffer: Vec::with_capacity(max_buffer_size),
            max_buffer_size,
            active_writer: None,
        }
    }

    /// Add a record to the buffer, flushing when full.
    pub fn add_record(&mut self, record: ExecutionAttempt) -> PersistenceResult<()> {
        self.buffer.push(record);

        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }

        Ok(())
    }

    fn close_active_writer(&mut self) -> PersistenceResult<()> {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush writer on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed execution audit writer"
            );
        }
        Ok(())
    }

    fn create_new_writer(&mut self, date: &str) -> PersistenceResult<()> {
        let filename = format!("{}/executions_{}.jsonl", self.base_dir, date);

        info!(filename = %filename, "Opening execution audit writer (append mode)");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)?;

        self.active_writer = Some(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        });

        Ok(())
    }

    /// Flush the buffer to the JSON Lines file.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let today = Utc::now().format("%Y-%m-%d").to_string();

        let needs_rotation = self
            .active_writer
            .as_ref()
            .map(|w| w.date != today)
            .unwrap_or(false);

        if needs_rotation {
            self.close_active_writer()?;
        }

        if self.active_writer.is_none() {
            self.create_new_writer(&today)?;
        }

        let record_count = self.buffer.len();

        {
            let active = self
                .active_writer
                .as_mut()
                .expect("active_writer should exist");

            for record in &self.buffer {
                let json = serde_json::to_string(record)?;
                writeln!(active.writer, "{}", json)?;
            }

            active.writer.flush()?;
            active.records_written += record_count;
        }

        debug!(
            date = %today,
            records = record_count,
            "Flushed execution attempts to JSON Lines"
        );

        self.buffer.clear();

        Ok(())
    }

    /// Close the writer, flushing any pending data.
    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active_writer()
    }
}

impl Drop for JsonLinesWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush buffer on drop");
        }
        if let Err(e) = self.close_active_writer() {
            warn!(?e, "Failed to close writer on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{
        AttemptId, ExecutionStatus, SignalFingerprint, Size, VenueId,
    };
    use rust_decimal_macros::dec;
    use std::io::{BufRead, BufReader};
    use tempfile::TempDir;

    fn make_attempt(n: i64) -> ExecutionAttempt {
        ExecutionAttempt {
            id: AttemptId::new(),
            signal_fingerprint: SignalFingerprint::from_string(format!("fp_{n}")),
            venue: VenueId::from("hyper"),
            symbol: "ETH-PERP".to_string(),
            status: ExecutionStatus::Filled,
            filled: Size::new(dec!(1.0)),
            remaining: Size::ZERO,
            order_id: Some(format!("v-{n}")),
            raw_response: None,
            error: None,
            latency_ms: 12,
            created_at_ms: 1_700_000_000_000 + n,
            revision: 0,
        }
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = JsonLinesWriter::new(temp_dir.path().to_str().unwrap(), 100);

        for i in 0..5 {
            writer.add_record(make_attempt(i)).unwrap();
        }
        writer.close().unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);

        let file = File::open(entries[0].path()).unwrap();
        let reader = BufReader::new(file);
        let lines: Vec<_> = reader.lines().filter_map(|l| l.ok()).collect();

        assert_eq!(lines.len(), 5);

        let record: ExecutionAttempt = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record.symbol, "ETH-PERP");
        assert_eq!(record.status, ExecutionStatus::Filled);
    }

    #[test]
    fn test_append_mode() {
        let temp_dir = TempDir::new().unwrap();

        {
            let mut writer = JsonLinesWriter::new(temp_dir.path().to_str().unwrap(), 100);
            for i in 0..3 {
                writer.add_record(make_attempt(i)).unwrap();
            }
            writer.close().unwrap();
        }

        {
            let mut writer = JsonLinesWriter::new(temp_dir.path().to_str().unwrap(), 100);
            for i in 3..6 {
                writer.add_record(make_attempt(i)).unwrap();
            }
            writer.close().unwrap();
        }

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();

        let file = File::open(entries[0].path()).unwrap();
        let reader = BufReader::new(file);
        let lines: Vec<_> = reader.lines().filter_map(|l| l.ok()).collect();

        assert_eq!(lines.len(), 6, "Should have 6 records total from 2 writes");
    }

    #[test]
    fn test_empty_flush_noop() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = JsonLinesWriter::new(temp_dir.path().to_str().unwrap(), 100);

        writer.flush().unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(entries.is_empty());
    }
}
