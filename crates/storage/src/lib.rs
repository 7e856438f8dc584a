pub mod backend;
pub mod error;
pub mod writer;

pub use backend::{LocalBackend, S3Backend, StorageBackend};
pub use error::{StorageError, WriteError};
pub use writer::{partition_key, BatchWriter, PartitionedWriter, WriteOutcome};
