// Library crate for shardio: one logical file served by a set of partition units.

pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod partition;
pub mod table;

pub use config::{DispatcherConfig, OpenMode, PartitionOptions, ShardConfig, Whence, load_config};
pub use directory::{Directory, InProcessDirectory, Location, Registration};
pub use dispatcher::{Dispatcher, Pending};
pub use error::{Result, ShardError};
pub use partition::{FlushReport, LocalPartition, PartitionRef, PartitionService, WriteAck};
pub use table::{PartitionLayout, PartitionSpan, PartitionTable};
