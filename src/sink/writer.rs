use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use thiserror::Error;
use tracing::info;

use crate::ingest::partition::partition_key;
use crate::ingest::record::{Batch, LogRecord};
use crate::sink::encoder::{EncodeError, ParquetEncoder};

/// Label for the group of records with no usable partition attribute.
const UNPARTITIONED: &str = "unpartitioned";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to encode partition {partition}: {source}")]
    Encode {
        partition: String,
        source: EncodeError,
    },

    #[error("failed to write {key}: {source}")]
    Put {
        key: String,
        source: object_store::Error,
    },
}

/// Writes a finished batch to the blob sink, one object per partition group.
///
/// Groups already written when a later group fails stay in place; retries can
/// therefore duplicate data, and query-time dedup on content_hash is the
/// consumer's remediation.
pub struct PartitionedWriter {
    store: Arc<dyn ObjectStore>,
    encoder: ParquetEncoder,
    prefix: String,
}

impl PartitionedWriter {
    pub fn new(store: Arc<dyn ObjectStore>, encoder: ParquetEncoder, prefix: String) -> Self {
        Self {
            store,
            encoder,
            prefix,
        }
    }

    pub async fn write_batch(&self, batch: &Batch) -> Result<(), WriteError> {
        if batch.is_empty() {
            return Ok(());
        }

        // BTreeMap keeps group emission order stable across runs.
        let mut groups: BTreeMap<String, Vec<&LogRecord>> = BTreeMap::new();
        for record in &batch.records {
            let key = partition_key(record);
            let key = if key.is_empty() {
                UNPARTITIONED.to_string()
            } else {
                key
            };
            groups.entry(key).or_default().push(record);
        }

        let start_time = batch.start_time().unwrap_or_else(Utc::now);
        let file_name = base_file_name(start_time, batch.number);

        for (partition, records) in groups {
            let object_key = if partition == UNPARTITIONED {
                format!("{}/{}", self.prefix, file_name)
            } else {
                format!("{}/{}/{}", self.prefix, partition, file_name)
            };

            let owned: Vec<LogRecord> = records.into_iter().cloned().collect();
            let data = self
                .encoder
                .encode(&owned)
                .map_err(|source| WriteError::Encode {
                    partition: partition.clone(),
                    source,
                })?;
            let size = data.len();

            let location = ObjectPath::from(object_key.clone());
            self.store
                .put(&location, PutPayload::from(Bytes::from(data)))
                .await
                .map_err(|source| WriteError::Put {
                    key: object_key.clone(),
                    source,
                })?;

            info!(
                key = %object_key,
                records = owned.len(),
                bytes = size,
                "wrote partition group"
            );
        }

        Ok(())
    }
}

/// Base file name for a batch: a pure function of its start time and number,
/// so the same batch always maps to the same set of object keys.
fn base_file_name(start_time: DateTime<Utc>, batch_number: u64) -> String {
    format!(
        "logs_{}_{}_{}_batch{:04}.parquet",
        start_time.format("%Y-%m-%d"),
        start_time.format("%H"),
        start_time.timestamp(),
        batch_number
    )
}
