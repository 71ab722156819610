use crate::entry::TimelineEntry;
use parking_lot::Mutex;
use qpsim_domain::{Error, Result};
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reads a timeline CSV file written by [`CsvTimelineWriter`] back into
/// [`TimelineEntry`] values, in order.
pub struct CsvTimelineReader;

impl CsvTimelineReader {
    /// Read every row of the file at `path`, skipping the header.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<TimelineEntry>> {
        let file = File::open(path).map_err(Error::Io)?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| Error::Storage(format!("failed to read timeline row: {e}")))?;
            if record.len() != TimelineEntry::HEADER.len() {
                return Err(Error::Storage(format!(
                    "timeline row has {} fields, expected {}",
                    record.len(),
                    TimelineEntry::HEADER.len()
                )));
            }
            let fields: [String; 15] = std::array::from_fn(|i| record[i].to_string());
            entries.push(TimelineEntry::from_csv_record(&fields)?);
        }
        Ok(entries)
    }
}

const DEFAULT_FLUSH_EVERY: usize = 10;

/// Streams [`TimelineEntry`] rows to a CSV file, flushing every `flush_every`
/// rows and once more on drop so a crash mid-interval doesn't lose an
/// already-written-but-unflushed row.
pub struct CsvTimelineWriter {
    writer: Mutex<csv::Writer<File>>,
    flush_every: usize,
    pending: AtomicUsize,
}

impl CsvTimelineWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_flush_every(path, DEFAULT_FLUSH_EVERY)
    }

    pub fn create_with_flush_every(path: impl AsRef<Path>, flush_every: usize) -> Result<Self> {
        let file = File::create(path).map_err(Error::Io)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .write_record(TimelineEntry::HEADER)
            .map_err(|e| Error::Storage(format!("failed to write timeline header: {e}")))?;
        Ok(Self {
            writer: Mutex::new(writer),
            flush_every: flush_every.max(1),
            pending: AtomicUsize::new(0),
        })
    }

    pub fn write(&self, entry: &TimelineEntry) -> Result<()> {
        let mut writer = self.writer.lock();
        writer
            .write_record(entry.to_csv_record())
            .map_err(|e| Error::Storage(format!("failed to write timeline row: {e}")))?;

        let pending = self.pending.fetch_add(1, Ordering::Relaxed) + 1;
        if pending >= self.flush_every {
            writer.flush().map_err(Error::Io)?;
            self.pending.store(0, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.writer.lock().flush().map_err(Error::Io)
    }
}

impl Drop for CsvTimelineWriter {
    fn drop(&mut self) {
        if let Err(e) = self.writer.lock().flush() {
            tracing::error!(error = %e, "failed to flush timeline CSV on close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_entry() -> TimelineEntry {
        TimelineEntry {
            timestamp: Utc::now(),
            simulated_time: Utc::now(),
            interval_sec: 10.0,
            multiplier: 1.2345,
            target_qps: 100.0,
            actual_qps: 98.5,
            total_queries: 985,
            total_errors: 3,
            active_workers: 8,
            avg_latency_us: 450.0,
            p50_latency_us: 400.0,
            p95_latency_us: 900.0,
            p99_latency_us: 1200.0,
            read_queries: 800,
            write_queries: 185,
        }
    }

    #[test]
    fn writes_header_and_rows_with_fixed_precision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeline.csv");
        {
            let writer = CsvTimelineWriter::create(&path).unwrap();
            writer.write(&sample_entry()).unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), TimelineEntry::HEADER.join(","));
        let row = lines.next().unwrap();
        assert!(row.contains("1.2345"));
        assert!(row.contains("100.00"));
    }

    #[test]
    fn round_trips_n_entries_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeline.csv");

        let mut written = Vec::new();
        {
            let writer = CsvTimelineWriter::create(&path).unwrap();
            for i in 0..5 {
                let mut entry = sample_entry();
                entry.total_queries = 100 + i;
                entry.multiplier = 1.0 + i as f64 * 0.25;
                writer.write(&entry).unwrap();
                written.push(entry);
            }
        }

        let read = CsvTimelineReader::read_all(&path).unwrap();
        assert_eq!(read.len(), written.len());
        for (original, round_tripped) in written.iter().zip(read.iter()) {
            // Timestamps round-trip through RFC3339, which loses no
            // precision here since `to_rfc3339`/`parse_from_rfc3339` are
            // inverses at the nanosecond resolution `Utc::now()` produces.
            assert_eq!(original.timestamp, round_tripped.timestamp);
            assert_eq!(original.simulated_time, round_tripped.simulated_time);
            assert_eq!(original.total_queries, round_tripped.total_queries);
            assert_eq!(original.total_errors, round_tripped.total_errors);
            assert_eq!(original.active_workers, round_tripped.active_workers);
            assert_eq!(original.read_queries, round_tripped.read_queries);
            assert_eq!(original.write_queries, round_tripped.write_queries);
            // Floats went through fixed-precision formatting on write, so
            // compare at that same precision rather than bit-for-bit.
            assert!((original.multiplier - round_tripped.multiplier).abs() < 1e-4);
            assert!((original.interval_sec - round_tripped.interval_sec).abs() < 1e-2);
            assert!((original.avg_latency_us - round_tripped.avg_latency_us).abs() < 1e-2);
        }
    }

    #[test]
    fn from_csv_record_rejects_malformed_timestamp() {
        let mut record = sample_entry().to_csv_record();
        record[0] = "not-a-timestamp".to_string();
        assert!(TimelineEntry::from_csv_record(&record).is_err());
    }

    #[test]
    fn flushes_every_n_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeline.csv");
        let writer = CsvTimelineWriter::create_with_flush_every(&path, 3).unwrap();
        for _ in 0..2 {
            writer.write(&sample_entry()).unwrap();
        }
        // Not yet flushed: file may contain only the header on some
        // platforms, but must not error. Writing the third row forces a
        // flush; verify post-flush the full contents are visible.
        writer.write(&sample_entry()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 4); // header + 3 rows
    }
}
