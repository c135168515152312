use std::collections::HashSet;
use std::sync::Mutex;

use crate::ingest::record::LogRecord;

/// Hive-style partition path for a record: `date=YYYY-MM-DD[/level=<level>]`.
///
/// The level segment is omitted for records whose severity could not be
/// determined; a record with no usable attribute at all maps to the empty
/// string and lands in the unpartitioned group.
pub fn partition_key(record: &LogRecord) -> String {
    let mut parts = Vec::with_capacity(2);

    let date = record.timestamp.format("%Y-%m-%d").to_string();
    if !date.is_empty() {
        parts.push(format!("date={date}"));
    }
    if !record.level.is_empty() && record.level != "unknown" {
        parts.push(format!("level={}", record.level));
    }

    parts.join("/")
}

/// Set of partition keys observed since startup. Feeds the stats endpoints
/// only; the writer recomputes grouping per batch.
#[derive(Default)]
pub struct PartitionTracker {
    seen: Mutex<HashSet<String>>,
}

impl PartitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, record: &LogRecord) {
        let key = partition_key(record);
        if key.is_empty() {
            return;
        }
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.insert(key);
    }

    pub fn count(&self) -> usize {
        let seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.len()
    }
}
