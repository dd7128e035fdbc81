//! Directory: where partition units live and how they are found by name.
//!
//! - `Directory`: locality discovery, placement of new units, and a flat
//!   symbolic name registry.
//! - `InProcessDirectory`: a single-process directory whose units are
//!   local actor tasks; the default for tests and single-node use.

mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{DispatcherConfig, PartitionOptions};
use crate::error::{Result, ShardError};
use crate::partition::PartitionRef;

pub use memory::InProcessDirectory;

/// A place partition units can be created on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub id: u32,
    pub name: String,
}

impl Location {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// The locality of the calling process.
    pub fn local() -> Self {
        Self::new(0, "local")
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// What a symbolic name resolves to.
#[derive(Clone)]
pub enum Registration {
    /// Encoded `DispatcherConfig` of a dispatcher.
    Dispatcher(Vec<u8>),
    Partition(PartitionRef),
}

impl Registration {
    pub fn dispatcher(config: &DispatcherConfig) -> Result<Self> {
        Ok(Registration::Dispatcher(config.encode()?))
    }

    pub fn into_config(self, name: &str) -> Result<DispatcherConfig> {
        match self {
            Registration::Dispatcher(raw) => DispatcherConfig::decode(&raw),
            Registration::Partition(_) => Err(ShardError::invalid(format!(
                "{name} names a partition, not a dispatcher"
            ))),
        }
    }

    pub fn into_partition(self, name: &str) -> Result<PartitionRef> {
        match self {
            Registration::Partition(p) => Ok(p),
            Registration::Dispatcher(_) => Err(ShardError::invalid(format!(
                "{name} names a dispatcher, not a partition"
            ))),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registration::Dispatcher(raw) => write!(f, "Dispatcher({} bytes)", raw.len()),
            Registration::Partition(p) => write!(f, "Partition({})", p.location()),
        }
    }
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// Localities available for placement, in a stable order.
    async fn resolve_locations(&self) -> Result<Vec<Location>>;

    /// Creates `count` closed partition units spread over `locations`.
    async fn create_partitions(
        &self,
        locations: &[Location],
        count: usize,
        options: &PartitionOptions,
    ) -> Result<Vec<PartitionRef>>;

    /// Fails with `NameTaken` if `name` is already registered.
    async fn register_name(&self, name: &str, entry: Registration) -> Result<()>;

    /// Fails with `NameNotFound` if `name` is not registered.
    async fn unregister_name(&self, name: &str) -> Result<()>;

    /// Fails with `NameNotFound` if `name` is not registered.
    async fn lookup(&self, name: &str) -> Result<Registration>;
}
