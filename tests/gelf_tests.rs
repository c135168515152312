use std::sync::Arc;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use clap::Parser;
use futures::TryStreamExt;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value;

use logsilo::config::Config;
use logsilo::gelf::message;
use logsilo::ingest::Ingestor;
use logsilo::sink::{ParquetEncoder, PartitionedWriter};

fn test_config(args: &[&str]) -> Config {
    let mut argv = vec!["logsilo", "--bucket", "test-bucket"];
    argv.extend_from_slice(args);
    Config::parse_from(argv)
}

fn make_ingestor(config: &Config) -> (Arc<Ingestor>, Arc<InMemory>) {
    let store = Arc::new(InMemory::new());
    let writer = PartitionedWriter::new(
        store.clone(),
        ParquetEncoder::new(config.compression),
        config.prefix.clone(),
    );
    (Arc::new(Ingestor::new(config, writer)), store)
}

struct StoredRecord {
    timestamp_nanos: i64,
    message: String,
    level: String,
}

async fn read_records(store: &InMemory) -> Vec<StoredRecord> {
    let objects: Vec<_> = store.list(None).try_collect().await.unwrap();
    let mut records = Vec::new();

    for meta in objects {
        let data: Bytes = store
            .get(&ObjectPath::from(meta.location.to_string()))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(data)
            .unwrap()
            .build()
            .unwrap();
        for batch in reader {
            let batch = batch.unwrap();
            let timestamps = batch
                .column(0)
                .as_any()
                .downcast_ref::<arrow::array::TimestampNanosecondArray>()
                .unwrap();
            let messages = batch
                .column(1)
                .as_any()
                .downcast_ref::<arrow::array::StringArray>()
                .unwrap();
            let levels = batch
                .column(2)
                .as_any()
                .downcast_ref::<arrow::array::StringArray>()
                .unwrap();
            for i in 0..batch.num_rows() {
                records.push(StoredRecord {
                    timestamp_nanos: timestamps.value(i),
                    message: messages.value(i).to_string(),
                    level: levels.value(i).to_string(),
                });
            }
        }
    }

    records
}

#[tokio::test]
async fn test_gelf_envelope_becomes_structured_record() {
    let config = test_config(&["--with-timestamps"]);
    let (ingestor, store) = make_ingestor(&config);

    let payload = br#"{"version":"1.1","host":"h","short_message":"hi","timestamp":1705314600,"level":6,"_service":"api"}"#;
    let msg = message::parse(payload).unwrap();
    ingestor.process_gelf(msg).await.unwrap();
    ingestor.flush().await.unwrap();

    let records = read_records(&store).await;
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record.level, "info");

    let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
    assert_eq!(record.timestamp_nanos, expected.timestamp_nanos_opt().unwrap());

    let body: Value = serde_json::from_str(&record.message).unwrap();
    assert_eq!(body["service"], "api");
    assert_eq!(body["message"], "hi");
    assert_eq!(body["host"], "h");
    assert!(body.get("_service").is_none());
}

#[tokio::test]
async fn test_gelf_zero_timestamp_uses_ingest_time() {
    let config = test_config(&["--with-timestamps"]);
    let (ingestor, store) = make_ingestor(&config);

    let before = Utc::now();
    let msg = message::parse(br#"{"short_message":"no clock","timestamp":0,"level":7}"#).unwrap();
    ingestor.process_gelf(msg).await.unwrap();
    let after = Utc::now();

    ingestor.flush().await.unwrap();

    let records = read_records(&store).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, "debug");

    let nanos = records[0].timestamp_nanos;
    assert!(nanos >= before.timestamp_nanos_opt().unwrap());
    assert!(nanos <= after.timestamp_nanos_opt().unwrap());
}

#[tokio::test]
async fn test_gelf_syslog_severities_partition_records() {
    let config = test_config(&["--with-timestamps"]);
    let (ingestor, store) = make_ingestor(&config);

    for (syslog, _expected) in [(2, "error"), (4, "warn"), (6, "info"), (7, "debug")] {
        let payload = format!(
            r#"{{"short_message":"sev {syslog}","timestamp":1705314600,"level":{syslog}}}"#
        );
        let msg = message::parse(payload.as_bytes()).unwrap();
        ingestor.process_gelf(msg).await.unwrap();
    }
    ingestor.flush().await.unwrap();

    let records = read_records(&store).await;
    assert_eq!(records.len(), 4);

    let mut levels: Vec<&str> = records.iter().map(|r| r.level.as_str()).collect();
    levels.sort();
    assert_eq!(levels, vec!["debug", "error", "info", "warn"]);

    let objects: Vec<_> = store.list(None).try_collect().await.unwrap();
    assert_eq!(objects.len(), 4, "one blob per level partition");
}

#[tokio::test]
async fn test_gelf_batch_of_newline_delimited_messages() {
    // Mirrors the /gelf HTTP path after decompression: each line is a
    // standalone envelope, malformed ones are dropped.
    let config = test_config(&[]);
    let (ingestor, _store) = make_ingestor(&config);

    let body = concat!(
        r#"{"short_message":"one","level":6}"#,
        "\n",
        "this is not gelf\n",
        r#"{"short_message":"two","level":3}"#,
        "\n",
    );

    let mut admitted = 0;
    for line in body.lines() {
        if line.is_empty() {
            continue;
        }
        match message::parse(line.as_bytes()) {
            Ok(msg) => {
                ingestor.process_gelf(msg).await.unwrap();
                admitted += 1;
            }
            Err(_) => continue,
        }
    }

    assert_eq!(admitted, 2);
    assert_eq!(ingestor.stats().total_lines, 2);
}
