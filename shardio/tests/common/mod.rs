#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use shardio::{
    Directory, FlushReport, InProcessDirectory, Location, OpenMode, PartitionOptions,
    PartitionRef, PartitionService, Registration, Result, ShardError, WriteAck, Whence,
};

pub fn random_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|_| rand::random::<u8>()).collect()
}

pub fn temp_file_with(data: &[u8]) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(data).unwrap();
    tmp.flush().unwrap();
    tmp
}

pub fn path_of(tmp: &tempfile::NamedTempFile) -> String {
    tmp.path().to_str().unwrap().to_string()
}

fn injected(what: &str) -> ShardError {
    ShardError::Io(std::io::Error::other(format!("injected {what} failure")))
}

/// Wraps a real unit: delays reads, fails selected calls, records read
/// completions.
pub struct TestPartition {
    index: usize,
    inner: PartitionRef,
    read_delay: Duration,
    fail_open: bool,
    fail_read: bool,
    fail_write: bool,
    completions: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl PartitionService for TestPartition {
    async fn open(&self, path: &str, mode: OpenMode) -> Result<()> {
        if self.fail_open {
            return Err(injected("open"));
        }
        self.inner.open(path, mode).await
    }

    async fn is_open(&self) -> Result<bool> {
        self.inner.is_open().await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        self.inner.remove_file(path).await
    }

    async fn read(&self, count: usize) -> Result<Vec<u8>> {
        self.inner.read(count).await
    }

    async fn pread(&self, count: usize, offset: u64) -> Result<Vec<u8>> {
        tokio::time::sleep(self.read_delay).await;
        if self.fail_read {
            return Err(injected("read"));
        }
        let out = self.inner.pread(count, offset).await;
        self.completions.lock().unwrap().push(self.index);
        out
    }

    async fn write(&self, data: Bytes) -> Result<usize> {
        self.inner.write(data).await
    }

    async fn pwrite(&self, data: Bytes, offset: u64) -> Result<WriteAck> {
        if self.fail_write {
            return Err(injected("write"));
        }
        self.inner.pwrite(data, offset).await
    }

    async fn flush(&self) -> Result<FlushReport> {
        self.inner.flush().await
    }

    async fn seek(&self, offset: i64, whence: Whence) -> Result<u64> {
        self.inner.seek(offset, whence).await
    }

    async fn tell(&self) -> Result<u64> {
        self.inner.tell().await
    }

    async fn size(&self) -> Result<u64> {
        self.inner.size().await
    }

    fn location(&self) -> Location {
        self.inner.location()
    }
}

/// In-process directory with injectable faults and call accounting.
#[derive(Default)]
pub struct TestDirectory {
    pub inner: InProcessDirectory,
    read_delays: Vec<Duration>,
    fail_open: Option<usize>,
    fail_read: Option<usize>,
    fail_write: Option<usize>,
    pub unregistered: AtomicUsize,
    pub created: Mutex<Vec<PartitionRef>>,
    pub completions: Arc<Mutex<Vec<usize>>>,
}

impl TestDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_delays(mut self, delays: Vec<Duration>) -> Self {
        self.read_delays = delays;
        self
    }

    pub fn failing_open_on(mut self, index: usize) -> Self {
        self.fail_open = Some(index);
        self
    }

    pub fn failing_read_on(mut self, index: usize) -> Self {
        self.fail_read = Some(index);
        self
    }

    pub fn failing_write_on(mut self, index: usize) -> Self {
        self.fail_write = Some(index);
        self
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregistered.load(Ordering::SeqCst)
    }

    pub fn created_units(&self) -> Vec<PartitionRef> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl Directory for TestDirectory {
    async fn resolve_locations(&self) -> Result<Vec<Location>> {
        self.inner.resolve_locations().await
    }

    async fn create_partitions(
        &self,
        locations: &[Location],
        count: usize,
        options: &PartitionOptions,
    ) -> Result<Vec<PartitionRef>> {
        let units = self
            .inner
            .create_partitions(locations, count, options)
            .await?
            .into_iter()
            .enumerate()
            .map(|(index, inner)| {
                Arc::new(TestPartition {
                    index,
                    inner,
                    read_delay: self.read_delays.get(index).copied().unwrap_or_default(),
                    fail_open: self.fail_open == Some(index),
                    fail_read: self.fail_read == Some(index),
                    fail_write: self.fail_write == Some(index),
                    completions: self.completions.clone(),
                }) as PartitionRef
            })
            .collect::<Vec<_>>();
        self.created.lock().unwrap().extend(units.iter().cloned());
        Ok(units)
    }

    async fn register_name(&self, name: &str, entry: Registration) -> Result<()> {
        self.inner.register_name(name, entry).await
    }

    async fn unregister_name(&self, name: &str) -> Result<()> {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
        self.inner.unregister_name(name).await
    }

    async fn lookup(&self, name: &str) -> Result<Registration> {
        self.inner.lookup(name).await
    }
}
