pub mod encoder;
pub mod store;
pub mod writer;

pub use encoder::ParquetEncoder;
pub use store::build_object_store;
pub use writer::PartitionedWriter;
