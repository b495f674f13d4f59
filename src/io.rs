//! On-disk formats: partition files and the compression of their spill frames.

pub mod compression;
pub mod partition;

pub use compression::{Compression, CompressionCodec};
pub use partition::{PartitionFile, RecordFormat, SpillCodec, partition_file_name};
