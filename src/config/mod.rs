use clap::{Parser, ValueEnum};

/// Runtime configuration for the ingestor.
///
/// Every option can be given as a flag or as a `LOGSILO_*` environment
/// variable. The parsed value is passed into constructors; nothing below
/// the entry point reads flags directly.
#[derive(Debug, Clone, Parser)]
#[command(name = "logsilo")]
#[command(about = "Log ingestion daemon writing partitioned Parquet to S3 or local disk", long_about = None)]
pub struct Config {
    /// S3 bucket name, or the local directory root when --local is set
    #[arg(long, env = "LOGSILO_BUCKET")]
    pub bucket: String,

    /// Key prefix under the bucket
    #[arg(long, env = "LOGSILO_PREFIX", default_value = "logs")]
    pub prefix: String,

    /// Number of log records per Parquet file
    #[arg(long, env = "LOGSILO_BATCH_SIZE", default_value_t = 10_000)]
    pub batch_size: usize,

    /// Parquet compression codec
    #[arg(long, env = "LOGSILO_COMPRESSION", value_enum, default_value = "snappy")]
    pub compression: Compression,

    /// Write to the local filesystem instead of S3
    #[arg(long, env = "LOGSILO_LOCAL")]
    pub local: bool,

    /// Extract event timestamps from log lines instead of stamping ingest time
    #[arg(long, env = "LOGSILO_WITH_TIMESTAMPS")]
    pub with_timestamps: bool,

    /// Custom S3 endpoint (MinIO and other S3-compatible stores)
    #[arg(long, env = "LOGSILO_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Access key for the custom endpoint
    #[arg(long, env = "LOGSILO_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// Secret key for the custom endpoint
    #[arg(long, env = "LOGSILO_SECRET_KEY")]
    pub secret_key: Option<String>,

    /// AWS region
    #[arg(long, env = "LOGSILO_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Run as an HTTP server instead of reading stdin
    #[arg(long, env = "LOGSILO_HTTP")]
    pub http: bool,

    /// HTTP server port
    #[arg(long, env = "LOGSILO_PORT", default_value_t = 8080)]
    pub port: u16,

    /// GELF TCP (and UDP) listener port
    #[arg(long, env = "LOGSILO_GELF_PORT", default_value_t = 12201)]
    pub gelf_port: u16,

    /// Also listen for GELF datagrams over UDP
    #[arg(long, env = "LOGSILO_UDP")]
    pub udp: bool,

    /// Drop duplicate log lines within the dedup window
    #[arg(long, env = "LOGSILO_DEDUPLICATE")]
    pub deduplicate: bool,

    /// Number of recent content hashes kept for deduplication
    #[arg(long, env = "LOGSILO_DEDUP_WINDOW", default_value_t = 100_000)]
    pub dedup_window: usize,

    /// Periodically flush the current batch
    #[arg(long, env = "LOGSILO_AUTO_FLUSH", default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_flush: bool,

    /// Auto-flush interval in seconds
    #[arg(long, env = "LOGSILO_AUTO_FLUSH_INTERVAL", default_value_t = 90)]
    pub auto_flush_interval: u64,

    /// Comma-separated JSON field names probed for a timestamp
    #[arg(long, env = "LOGSILO_TIMESTAMP_FIELDS", default_value = "timestamp,time,@timestamp")]
    pub timestamp_fields: String,

    /// Comma-separated JSON field names probed for a log level
    #[arg(long, env = "LOGSILO_LEVEL_FIELDS", default_value = "level,severity,severityText")]
    pub level_fields: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum Compression {
    Snappy,
    Gzip,
    None,
}

impl Config {
    pub fn timestamp_fields(&self) -> Vec<String> {
        split_fields(&self.timestamp_fields)
    }

    pub fn level_fields(&self) -> Vec<String> {
        split_fields(&self.level_fields)
    }
}

fn split_fields(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}
