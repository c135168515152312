use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// A normalized log record, ready for columnar encoding.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Event time, UTC. Source-derived when timestamp extraction is on,
    /// ingest time otherwise.
    pub timestamp: DateTime<Utc>,

    /// The full original line (flattened GELF arrives as single-line JSON).
    pub message: String,

    /// Normalized severity: error, warn, info, debug or unknown.
    pub level: String,

    /// Per-process admission sequence number, starting at 1.
    pub line_number: i64,

    /// 16 hex chars of SHA-256 over message + RFC3339 timestamp.
    pub content_hash: String,
}

/// Compute the deduplication fingerprint for a (message, timestamp) pair.
pub fn content_hash(message: &str, timestamp: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hasher.update(
        timestamp
            .to_rfc3339_opts(SecondsFormat::AutoSi, true)
            .as_bytes(),
    );
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// The in-memory batch currently accumulating records.
///
/// Mutable while the ingestor appends to it; ownership moves to the
/// partitioned writer on rollover and the batch is immutable from there on.
#[derive(Debug)]
pub struct Batch {
    pub records: Vec<LogRecord>,
    pub number: u64,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn new(number: u64, capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            number,
            start_time: None,
            end_time: None,
        }
    }

    /// Append a record, widening the batch time range to cover it.
    pub fn push(&mut self, record: LogRecord) {
        let ts = record.timestamp;
        self.start_time = Some(match self.start_time {
            Some(start) if start <= ts => start,
            _ => ts,
        });
        self.end_time = Some(match self.end_time {
            Some(end) if end >= ts => end,
            _ => ts,
        });
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Earliest record timestamp; None while the batch is empty.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Latest record timestamp; None while the batch is empty.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_record(timestamp: DateTime<Utc>, message: &str) -> LogRecord {
        LogRecord {
            timestamp,
            message: message.to_string(),
            level: "info".to_string(),
            line_number: 1,
            content_hash: content_hash(message, timestamp),
        }
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let a = content_hash("db down", ts);
        let b = content_hash("db down", ts);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_hash_varies_with_inputs() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let other = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 1).unwrap();
        assert_ne!(content_hash("a", ts), content_hash("b", ts));
        assert_ne!(content_hash("a", ts), content_hash("a", other));
    }

    #[test]
    fn test_batch_time_range_covers_all_records() {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let mut batch = Batch::new(0, 16);
        assert!(batch.start_time().is_none());

        batch.push(make_record(base + chrono::Duration::seconds(5), "b"));
        batch.push(make_record(base, "a"));
        batch.push(make_record(base + chrono::Duration::seconds(2), "c"));

        assert_eq!(batch.start_time(), Some(base));
        assert_eq!(
            batch.end_time(),
            Some(base + chrono::Duration::seconds(5))
        );
        for record in &batch.records {
            assert!(batch.start_time().unwrap() <= record.timestamp);
            assert!(record.timestamp <= batch.end_time().unwrap());
        }
    }
}
