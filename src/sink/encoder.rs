use std::sync::Arc;

use arrow::array::{Int64Array, StringArray, TimestampNanosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression as ParquetCompression, GzipLevel};
use parquet::file::properties::WriterProperties;
use thiserror::Error;

use crate::config::Compression;
use crate::ingest::record::LogRecord;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

/// Serializes a record slice into a self-describing Parquet file in memory.
///
/// The schema (timestamp, message, level, line_number, content_hash) is
/// embedded in the file, so consumers need no external metadata.
pub struct ParquetEncoder {
    schema: Arc<Schema>,
    properties: WriterProperties,
}

impl ParquetEncoder {
    pub fn new(compression: Compression) -> Self {
        let schema = Arc::new(Schema::new(vec![
            Field::new(
                "timestamp",
                DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into())),
                false,
            ),
            Field::new("message", DataType::Utf8, false),
            Field::new("level", DataType::Utf8, false),
            Field::new("line_number", DataType::Int64, false),
            Field::new("content_hash", DataType::Utf8, false),
        ]));

        let codec = match compression {
            Compression::Snappy => ParquetCompression::SNAPPY,
            Compression::Gzip => ParquetCompression::GZIP(GzipLevel::default()),
            Compression::None => ParquetCompression::UNCOMPRESSED,
        };

        let properties = WriterProperties::builder()
            .set_compression(codec)
            .build();

        Self { schema, properties }
    }

    pub fn encode(&self, records: &[LogRecord]) -> Result<Vec<u8>, EncodeError> {
        let timestamps = TimestampNanosecondArray::from(
            records
                .iter()
                .map(|r| r.timestamp.timestamp_nanos_opt().unwrap_or_default())
                .collect::<Vec<i64>>(),
        )
        .with_timezone("UTC");
        let messages = StringArray::from(
            records.iter().map(|r| r.message.as_str()).collect::<Vec<_>>(),
        );
        let levels = StringArray::from(
            records.iter().map(|r| r.level.as_str()).collect::<Vec<_>>(),
        );
        let line_numbers = Int64Array::from(
            records.iter().map(|r| r.line_number).collect::<Vec<i64>>(),
        );
        let content_hashes = StringArray::from(
            records
                .iter()
                .map(|r| r.content_hash.as_str())
                .collect::<Vec<_>>(),
        );

        let batch = RecordBatch::try_new(
            self.schema.clone(),
            vec![
                Arc::new(timestamps),
                Arc::new(messages),
                Arc::new(levels),
                Arc::new(line_numbers),
                Arc::new(content_hashes),
            ],
        )?;

        let buffer = Vec::with_capacity(64 * 1024);
        let mut writer =
            ArrowWriter::try_new(buffer, self.schema.clone(), Some(self.properties.clone()))?;
        writer.write(&batch)?;
        let buffer = writer.into_inner()?;

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn make_records(count: usize) -> Vec<LogRecord> {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        (0..count)
            .map(|i| LogRecord {
                timestamp: base + chrono::Duration::seconds(i as i64),
                message: format!("message {i}"),
                level: "info".to_string(),
                line_number: i as i64 + 1,
                content_hash: format!("{:016x}", i),
            })
            .collect()
    }

    fn decode(data: Vec<u8>) -> Vec<RecordBatch> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))
            .unwrap()
            .build()
            .unwrap();
        reader.map(|b| b.unwrap()).collect()
    }

    #[test]
    fn test_encode_embeds_schema_and_rows() {
        let encoder = ParquetEncoder::new(Compression::Snappy);
        let records = make_records(3);
        let data = encoder.encode(&records).unwrap();

        let batches = decode(data);
        let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total_rows, 3);

        let schema = batches[0].schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec!["timestamp", "message", "level", "line_number", "content_hash"]
        );
    }

    #[test]
    fn test_encode_round_trips_messages() {
        let encoder = ParquetEncoder::new(Compression::None);
        let records = make_records(2);
        let data = encoder.encode(&records).unwrap();

        let batches = decode(data);
        let messages = batches[0]
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(messages.value(0), "message 0");
        assert_eq!(messages.value(1), "message 1");

        let line_numbers = batches[0]
            .column(3)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(line_numbers.value(0), 1);
        assert_eq!(line_numbers.value(1), 2);
    }

    #[test]
    fn test_all_codecs_produce_readable_files() {
        for compression in [Compression::Snappy, Compression::Gzip, Compression::None] {
            let encoder = ParquetEncoder::new(compression);
            let data = encoder.encode(&make_records(10)).unwrap();
            let batches = decode(data);
            let total: usize = batches.iter().map(|b| b.num_rows()).sum();
            assert_eq!(total, 10, "codec {compression:?}");
        }
    }
}
