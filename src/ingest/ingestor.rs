use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::gelf::message::GelfMessage;
use crate::ingest::dedup::DedupWindow;
use crate::ingest::level::{extract_level, syslog_level};
use crate::ingest::partition::PartitionTracker;
use crate::ingest::record::{content_hash, Batch, LogRecord};
use crate::ingest::timestamp::extract_timestamp;
use crate::sink::writer::{PartitionedWriter, WriteError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("batch write failed: {0}")]
    Write(#[from] WriteError),

    #[error("failed to serialize flattened GELF message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Counters reported by the HTTP stats endpoints and the stdin summary.
#[derive(Debug, Clone)]
pub struct IngestStats {
    pub total_lines: i64,
    pub unique_lines: i64,
    pub duplicates_skipped: i64,
    pub partitions: usize,
    pub dedup_enabled: bool,
    pub dedup_cache_size: usize,
}

/// State behind the admission mutex. The mutex is never held across an
/// await; a full batch is detached under the lock and written afterwards,
/// with `flush_lock` serializing writers.
struct IngestState {
    batch: Batch,
    line_count: i64,
    duplicate_count: i64,
}

/// The ingestion pipeline core: admits normalized lines into the current
/// batch and hands full or flushed batches to the partitioned writer.
pub struct Ingestor {
    batch_size: usize,
    with_timestamps: bool,
    timestamp_fields: Vec<String>,
    level_fields: Vec<String>,
    state: Mutex<IngestState>,
    dedup: Option<DedupWindow>,
    partitions: PartitionTracker,
    writer: PartitionedWriter,
    flush_lock: tokio::sync::Mutex<()>,
}

impl Ingestor {
    pub fn new(config: &Config, writer: PartitionedWriter) -> Self {
        let dedup = config
            .deduplicate
            .then(|| DedupWindow::new(config.dedup_window));

        Self {
            batch_size: config.batch_size,
            with_timestamps: config.with_timestamps,
            timestamp_fields: config.timestamp_fields(),
            level_fields: config.level_fields(),
            state: Mutex::new(IngestState {
                batch: Batch::new(0, config.batch_size),
                line_count: 0,
                duplicate_count: 0,
            }),
            dedup,
            partitions: PartitionTracker::new(),
            writer,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Admit one log line.
    ///
    /// Duplicate lines (dedup enabled) are swallowed after advancing the line
    /// counter. When the admission fills the batch, the caller that tripped
    /// the threshold performs the write; a fresh batch is already installed
    /// before the admission mutex is released, so a write failure loses the
    /// detached records but never blocks subsequent admissions.
    pub async fn process_line(&self, line: &str) -> Result<(), IngestError> {
        let now = Utc::now();
        let timestamp = if self.with_timestamps {
            extract_timestamp(line, &self.timestamp_fields, now)
        } else {
            now
        };
        let hash = content_hash(line, timestamp);

        let full_batch = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.line_count += 1;

            if let Some(dedup) = &self.dedup {
                if dedup.contains(&hash) {
                    state.duplicate_count += 1;
                    return Ok(());
                }
                dedup.add(&hash);
            }

            let level = extract_level(line, &self.level_fields)
                .unwrap_or_else(|| "unknown".to_string());
            let record = LogRecord {
                timestamp,
                message: line.to_string(),
                level,
                line_number: state.line_count,
                content_hash: hash,
            };

            self.partitions.observe(&record);
            state.batch.push(record);

            if state.batch.len() >= self.batch_size {
                let next = Batch::new(state.batch.number + 1, self.batch_size);
                Some(std::mem::replace(&mut state.batch, next))
            } else {
                None
            }
        };

        if let Some(batch) = full_batch {
            let _writing = self.flush_lock.lock().await;
            self.writer.write_batch(&batch).await?;
        }

        Ok(())
    }

    /// Admit a decoded GELF envelope by flattening it to a single JSON line.
    ///
    /// Severity comes from the embedded message when it yields one, with the
    /// GELF syslog level as fallback.
    pub async fn process_gelf(&self, message: GelfMessage) -> Result<(), IngestError> {
        let level = extract_level(&message.short_message, &self.level_fields)
            .unwrap_or_else(|| syslog_level(message.level).to_string());
        let line = message.flatten(&level, Utc::now())?;
        self.process_line(&line).await
    }

    /// Write out the current batch. A no-op returning Ok when it is empty;
    /// otherwise the batch is detached, a fresh one installed, and the
    /// detached records go to the sink outside the admission mutex.
    pub async fn flush(&self) -> Result<(), IngestError> {
        let _writing = self.flush_lock.lock().await;

        let batch = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.batch.is_empty() {
                return Ok(());
            }
            let next = Batch::new(state.batch.number + 1, self.batch_size);
            std::mem::replace(&mut state.batch, next)
        };

        self.writer.write_batch(&batch).await?;
        Ok(())
    }

    /// Records sitting in the current batch. Used by the periodic flusher to
    /// skip idle cycles without going through the flush lock.
    pub fn pending_records(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.batch.len()
    }

    /// Number the next flushed batch will carry.
    pub fn current_batch_number(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.batch.number
    }

    pub fn stats(&self) -> IngestStats {
        let (total_lines, duplicates_skipped) = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            (state.line_count, state.duplicate_count)
        };

        IngestStats {
            total_lines,
            unique_lines: total_lines - duplicates_skipped,
            duplicates_skipped,
            partitions: self.partitions.count(),
            dedup_enabled: self.dedup.is_some(),
            dedup_cache_size: self.dedup.as_ref().map(DedupWindow::len).unwrap_or(0),
        }
    }
}

/// Spawn the periodic flush worker. It checks batch emptiness under a brief
/// lock each tick and flushes when there is something to write; the shutdown
/// signal stops it between ticks.
pub fn spawn_auto_flush(
    ingestor: Arc<Ingestor>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let pending = ingestor.pending_records();
                    if pending == 0 {
                        debug!("auto-flush: no data to flush");
                        continue;
                    }
                    match ingestor.flush().await {
                        Ok(()) => info!(records = pending, "auto-flush completed"),
                        Err(e) => error!(error = %e, "auto-flush failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("auto-flush worker stopping");
                        return;
                    }
                }
            }
        }
    })
}
