pub mod dedup;
pub mod ingestor;
pub mod level;
pub mod partition;
pub mod record;
pub mod timestamp;

pub use ingestor::{spawn_auto_flush, IngestError, IngestStats, Ingestor};
pub use record::{Batch, LogRecord};
