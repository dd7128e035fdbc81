//! Partition units.
//!
//! A unit owns one open handle on the shared file together with a single
//! cached read-ahead chunk and a lazy write buffer. `LocalFile` is the state
//! machine; `LocalPartition` runs it behind a channel so that every
//! operation on a unit is serialized while units proceed in parallel.

pub mod buffer;
pub mod cache;
pub mod local;
pub mod service;

pub use buffer::{FailedWrite, FlushReport};
pub use local::{LocalFile, WriteAck};
pub use service::{LocalPartition, PartitionRef, PartitionService};
