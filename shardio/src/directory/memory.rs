use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Directory, Location, Registration};
use crate::config::PartitionOptions;
use crate::error::{Result, ShardError};
use crate::partition::{LocalPartition, PartitionRef};

/// Directory backed by a map in this process.
///
/// It reports `locality_count` localities and places units on them round
/// robin; every unit is a task on the current runtime.
pub struct InProcessDirectory {
    localities: u32,
    names: RwLock<HashMap<String, Registration>>,
}

impl InProcessDirectory {
    pub fn new(locality_count: u32) -> Self {
        Self {
            localities: locality_count.max(1),
            names: RwLock::new(HashMap::new()),
        }
    }

    /// Registered names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for InProcessDirectory {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl Directory for InProcessDirectory {
    async fn resolve_locations(&self) -> Result<Vec<Location>> {
        Ok((0..self.localities)
            .map(|id| Location::new(id, "locality"))
            .collect())
    }

    async fn create_partitions(
        &self,
        locations: &[Location],
        count: usize,
        options: &PartitionOptions,
    ) -> Result<Vec<PartitionRef>> {
        if locations.is_empty() {
            return Err(ShardError::invalid("no locations to place partitions on"));
        }
        options.validate()?;
        let units = (0..count)
            .map(|i| {
                let location = locations[i % locations.len()].clone();
                Arc::new(LocalPartition::spawn(options.clone(), location)) as PartitionRef
            })
            .collect();
        debug!(count, localities = locations.len(), "partition units created");
        Ok(units)
    }

    async fn register_name(&self, name: &str, entry: Registration) -> Result<()> {
        let mut names = self.names.write().await;
        if names.contains_key(name) {
            return Err(ShardError::NameTaken(name.to_string()));
        }
        names.insert(name.to_string(), entry);
        Ok(())
    }

    async fn unregister_name(&self, name: &str) -> Result<()> {
        self.names
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ShardError::NameNotFound(name.to_string()))
    }

    async fn lookup(&self, name: &str) -> Result<Registration> {
        self.names
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ShardError::NameNotFound(name.to_string()))
    }
}
