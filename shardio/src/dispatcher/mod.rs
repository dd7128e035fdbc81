//! Dispatcher: one logical file over a table of partition units.
//!
//! Responsibilities:
//! - create the units through a `Directory`, register them by name and open
//!   the file on all of them (`create`), or attach to units another
//!   dispatcher registered (`connect`);
//! - split every logical read or write into one call per touched partition,
//!   issue them concurrently and join the results in partition order;
//! - own the logical cursor used by the non-positional calls;
//! - tear the registration down again (`destroy`) if it created it.

mod fanout;
mod pending;

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, instrument, warn};

use crate::config::{DispatcherConfig, OpenMode, PartitionOptions, Whence};
use crate::directory::{Directory, Registration};
use crate::error::{Result, ShardError};
use crate::partition::{FlushReport, PartitionRef};
use crate::table::{PartitionLayout, PartitionTable};

pub use pending::Pending;

pub struct Dispatcher {
    directory: Arc<dyn Directory>,
    config: DispatcherConfig,
    table: Arc<PartitionTable>,
    cursor: u64,
    open: bool,
    created: bool,
    destroyed: bool,
}

impl Dispatcher {
    /// Creates `config.partition_count` units, registers them under
    /// `config.symbolic_name` and opens `config.file_name` on each of them.
    ///
    /// If anything fails the units that opened are closed and every name
    /// registered so far is removed again.
    #[instrument(
        level = "debug",
        skip_all,
        fields(name = %config.symbolic_name, partitions = config.partition_count)
    )]
    pub async fn create(
        directory: Arc<dyn Directory>,
        config: DispatcherConfig,
        options: PartitionOptions,
    ) -> Result<Self> {
        config.validate()?;
        options.validate()?;
        directory
            .register_name(&config.symbolic_name, Registration::dispatcher(&config)?)
            .await?;

        let mut registered = vec![config.symbolic_name.clone()];
        let (table, cursor) =
            match Self::build(directory.as_ref(), &config, &options, &mut registered).await {
                Ok(built) => built,
                Err(err) => {
                    for name in &registered {
                        if let Err(unreg) = directory.unregister_name(name).await {
                            warn!(name = %name, "rollback could not unregister: {unreg}");
                        }
                    }
                    return Err(err);
                }
            };

        info!(
            name = %config.symbolic_name,
            file = %config.file_name,
            partitions = config.partition_count,
            file_size = table.layout().file_size,
            "dispatcher created"
        );
        Ok(Self {
            directory,
            config,
            table: Arc::new(table),
            cursor,
            open: true,
            created: true,
            destroyed: false,
        })
    }

    async fn build(
        directory: &dyn Directory,
        config: &DispatcherConfig,
        options: &PartitionOptions,
        registered: &mut Vec<String>,
    ) -> Result<(PartitionTable, u64)> {
        let count = config.partition_count;
        let locations = directory.resolve_locations().await?;
        let partitions = directory
            .create_partitions(&locations, count, options)
            .await?;
        if partitions.len() != count {
            return Err(ShardError::remote(format!(
                "directory created {} of {count} partitions",
                partitions.len()
            )));
        }
        for (index, unit) in partitions.iter().enumerate() {
            let name = config.partition_name(index);
            directory
                .register_name(&name, Registration::Partition(unit.clone()))
                .await?;
            registered.push(name);
        }

        let (file_size, position) =
            fanout::open_all(&partitions, &config.file_name, config.mode).await?;
        let layout = PartitionLayout::build(file_size, count)?;
        Ok((PartitionTable::new(layout, partitions)?, position))
    }

    /// Attaches to the dispatcher registered under `symbolic_name`.
    ///
    /// The returned dispatcher shares the units but does not own them:
    /// `destroy` leaves every registration in place.
    pub async fn connect(directory: Arc<dyn Directory>, symbolic_name: &str) -> Result<Self> {
        let config = directory
            .lookup(symbolic_name)
            .await?
            .into_config(symbolic_name)?;
        config.validate()?;

        let mut partitions: Vec<PartitionRef> = Vec::with_capacity(config.partition_count);
        for index in 0..config.partition_count {
            let name = config.partition_name(index);
            partitions.push(directory.lookup(&name).await?.into_partition(&name)?);
        }

        let open = match partitions.first() {
            Some(first) => first.is_open().await?,
            None => false,
        };
        let (file_size, cursor) = match partitions.first() {
            Some(first) if open => (first.size().await?, first.tell().await?),
            _ => (0, 0),
        };
        let layout = PartitionLayout::build(file_size, config.partition_count)?;
        info!(name = symbolic_name, file_size, "attached to dispatcher");
        Ok(Self {
            directory,
            config,
            table: Arc::new(PartitionTable::new(layout, partitions)?),
            cursor,
            open,
            created: false,
            destroyed: false,
        })
    }

    /// Closes the current file on every partition and opens `file_name`.
    ///
    /// The layout is rebuilt from the new file size and the cursor is reset
    /// to the position partition 0 reports.
    pub async fn open(&mut self, file_name: &str, mode: OpenMode) -> Result<()> {
        self.close().await?;
        let (file_size, position) =
            fanout::open_all(self.table.partitions(), file_name, mode).await?;
        self.table = Arc::new(self.table.relayout(file_size)?);
        self.cursor = position;
        self.open = true;
        self.config.file_name = file_name.to_string();
        self.config.mode = mode;

        if self.created {
            // keep the published record in step for dispatchers that attach later
            let name = &self.config.symbolic_name;
            self.directory.unregister_name(name).await?;
            self.directory
                .register_name(name, Registration::dispatcher(&self.config)?)
                .await?;
        }
        Ok(())
    }

    /// Flushes and closes the file on every partition. A no-op when closed.
    pub async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        fanout::close_all(self.table.partitions()).await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open { Ok(()) } else { Err(ShardError::Closed) }
    }

    /// Reads `size` bytes at `offset`. Fewer bytes come back only at the end
    /// of the file.
    pub async fn read_at(&self, offset: u64, size: usize) -> Result<Vec<u8>> {
        self.ensure_open()?;
        fanout::gather_read(&self.table, offset, size).await
    }

    pub fn read_at_async(&self, offset: u64, size: usize) -> Pending<Vec<u8>> {
        let table = self.table.clone();
        let open = self.ensure_open();
        Pending::spawn(async move {
            open?;
            fanout::gather_read(&table, offset, size).await
        })
    }

    /// Reads at the cursor and advances it by `size`.
    pub async fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        let out = self.read_at(self.cursor, size).await?;
        self.cursor = self.cursor.saturating_add(size as u64);
        Ok(out)
    }

    pub fn read_async(&mut self, size: usize) -> Pending<Vec<u8>> {
        let pending = self.read_at_async(self.cursor, size);
        self.cursor = self.cursor.saturating_add(size as u64);
        pending
    }

    /// Writes `data` at `offset`, split across the partitions it touches.
    /// Returns the number of bytes accepted; with lazy writes some of them may
    /// still be buffered in the units.
    ///
    /// In append modes `offset` is ignored: the whole payload is appended to
    /// the end of the file through partition 0 in one write.
    pub async fn write_at(&self, offset: u64, data: impl Into<Bytes>) -> Result<usize> {
        self.ensure_open()?;
        route_write(&self.table, self.config.mode, offset, data.into()).await
    }

    pub fn write_at_async(&self, offset: u64, data: impl Into<Bytes>) -> Pending<usize> {
        let table = self.table.clone();
        let open = self.ensure_open();
        let mode = self.config.mode;
        let data = data.into();
        Pending::spawn(async move {
            open?;
            route_write(&table, mode, offset, data).await
        })
    }

    /// Writes at the cursor and advances it by the accepted count.
    pub async fn write(&mut self, data: impl Into<Bytes>) -> Result<usize> {
        let written = self.write_at(self.cursor, data).await?;
        self.cursor = self.cursor.saturating_add(written as u64);
        Ok(written)
    }

    /// Writes at the cursor. The cursor advances by the payload length when
    /// the call is issued.
    pub fn write_async(&mut self, data: impl Into<Bytes>) -> Pending<usize> {
        let data = data.into();
        let len = data.len() as u64;
        let pending = self.write_at_async(self.cursor, data);
        self.cursor = self.cursor.saturating_add(len);
        pending
    }

    /// Applies every buffered write on every partition.
    pub async fn flush(&self) -> Result<FlushReport> {
        self.ensure_open()?;
        fanout::flush_all(&self.table).await
    }

    /// Moves the cursor. `Whence::End` is relative to the file size the layout
    /// was built from.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.cursor = whence.resolve(offset, self.cursor, self.table.layout().file_size)?;
        Ok(self.cursor)
    }

    /// `seek` with a raw `SEEK_SET`/`SEEK_CUR`/`SEEK_END` value.
    pub fn seek_raw(&mut self, offset: i64, whence: i32) -> Result<u64> {
        self.seek(offset, Whence::try_from(whence)?)
    }

    pub fn tell(&self) -> u64 {
        self.cursor
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn layout(&self) -> &PartitionLayout {
        self.table.layout()
    }

    pub fn partitions(&self) -> &[PartitionRef] {
        self.table.partitions()
    }

    pub fn file_size(&self) -> u64 {
        self.table.layout().file_size
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Tears down what this dispatcher created: closes the file on every
    /// partition and unregisters the dispatcher name and every partition
    /// name. Does nothing for a dispatcher obtained through `connect`.
    ///
    /// Every step is attempted; the first error is returned.
    pub async fn destroy(mut self) -> Result<()> {
        self.destroyed = true;
        if !self.created {
            return Ok(());
        }
        let mut first = None;
        if let Err(err) = self.close().await {
            warn!(name = %self.config.symbolic_name, "close during destroy failed: {err}");
            first.get_or_insert(err);
        }

        let names = std::iter::once(self.config.symbolic_name.clone())
            .chain((0..self.config.partition_count).map(|i| self.config.partition_name(i)));
        for name in names {
            if let Err(err) = self.directory.unregister_name(&name).await {
                warn!(name = %name, "unregister during destroy failed: {err}");
                first.get_or_insert(err);
            }
        }
        info!(name = %self.config.symbolic_name, "dispatcher destroyed");
        first.map_or(Ok(()), Err)
    }
}

async fn route_write(
    table: &PartitionTable,
    mode: OpenMode,
    offset: u64,
    data: Bytes,
) -> Result<usize> {
    if mode.appends() {
        fanout::append_write(table, data).await
    } else {
        fanout::gather_write(table, offset, data).await
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.created && !self.destroyed {
            warn!(
                name = %self.config.symbolic_name,
                "dispatcher dropped without destroy, names stay registered"
            );
        }
    }
}
