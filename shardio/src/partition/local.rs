//! LocalFile: one partition unit over a real file.
//!
//! All positioned I/O goes through `tokio::fs::File`, so the blocking calls run
//! on tokio's blocking pool. A `LocalFile` is not shared; the owning actor in
//! `service` serializes every operation on it.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use super::buffer::{FailedWrite, FlushReport, PendingWrite, WriteBuffer};
use super::cache::{ChunkCache, ReadPlan};
use crate::config::{OpenMode, PartitionOptions, Whence};
use crate::error::{Result, ShardError};

/// Result of a positional write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteAck {
    /// Bytes applied to the file during the call (0 when only buffered).
    pub written: usize,
    /// Bytes still buffered after the call.
    pub pending: usize,
}

struct OpenFile {
    file: File,
    path: PathBuf,
    mode: OpenMode,
    position: u64,
}

pub struct LocalFile {
    options: PartitionOptions,
    inner: Option<OpenFile>,
    cache: ChunkCache,
    buffer: WriteBuffer,
}

async fn read_range(file: &mut File, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    // no file extends past the largest `off_t`
    if offset > i64::MAX as u64 {
        return Ok(Vec::new());
    }
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

async fn write_range(file: &mut File, offset: u64, data: &[u8]) -> io::Result<usize> {
    file.seek(SeekFrom::Start(offset)).await?;
    file.write_all(data).await?;
    // tokio completes writes in the background; flush surfaces their errors here.
    file.flush().await?;
    Ok(data.len())
}

fn check_range(offset: u64, len: usize) -> Result<()> {
    match offset.checked_add(len as u64) {
        Some(_) => Ok(()),
        None => Err(ShardError::invalid(format!(
            "write of {len} bytes at {offset} overflows the file offset"
        ))),
    }
}

impl LocalFile {
    pub fn new(options: PartitionOptions) -> Self {
        let chunk_size = options.chunk_size.max(1);
        Self {
            cache: ChunkCache::new(chunk_size),
            buffer: WriteBuffer::new(chunk_size),
            options,
            inner: None,
        }
    }

    pub fn options(&self) -> &PartitionOptions {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.as_ref().map(|f| f.path.as_path())
    }

    pub fn cached_chunk(&self) -> Option<u64> {
        self.cache.chunk_index()
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.pending_bytes()
    }

    /// Opens `path`, closing (and flushing) any file that is already open.
    pub async fn open(&mut self, path: impl AsRef<Path>, mode: OpenMode) -> Result<()> {
        if self.inner.is_some() {
            self.close().await?;
        }
        let path = path.as_ref().to_path_buf();
        let file = mode.open_options().open(&path).await?;
        let position = if mode.appends() {
            file.metadata().await?.len()
        } else {
            0
        };
        debug!(path = %path.display(), %mode, "partition file opened");
        self.cache.invalidate();
        self.buffer.clear();
        self.inner = Some(OpenFile {
            file,
            path,
            mode,
            position,
        });
        Ok(())
    }

    /// Flushes pending writes and closes the file. A no-op when closed.
    ///
    /// The file is closed even if the flush fails; the failed writes are
    /// reported as `PartialFlush` and dropped.
    pub async fn close(&mut self) -> Result<()> {
        if self.inner.is_none() {
            return Ok(());
        }
        let report = self.flush_buffer().await;
        let lost = self.buffer.pending_bytes();
        self.buffer.clear();
        self.cache.invalidate();
        if let Some(mut open) = self.inner.take() {
            if let Err(err) = open.file.flush().await {
                warn!(path = %open.path.display(), "flush on close failed: {err}");
            }
            debug!(path = %open.path.display(), "partition file closed");
        }
        if !report.is_complete() {
            return Err(ShardError::PartialFlush {
                failed: report.failed.len(),
                retained_bytes: lost,
            });
        }
        Ok(())
    }

    pub async fn remove_file(&self, path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    /// Reads `count` bytes at the current position and advances it.
    pub async fn read(&mut self, count: usize) -> Result<Vec<u8>> {
        let pos = self.inner.as_ref().ok_or(ShardError::Closed)?.position;
        let out = self.read_through_cache(pos, count).await?;
        if let Some(open) = self.inner.as_mut() {
            open.position = pos + out.len() as u64;
        }
        Ok(out)
    }

    /// Reads `count` bytes at `offset` without moving the position.
    pub async fn pread(&mut self, count: usize, offset: u64) -> Result<Vec<u8>> {
        if self.inner.is_none() {
            return Err(ShardError::Closed);
        }
        self.read_through_cache(offset, count).await
    }

    async fn read_through_cache(&mut self, pos: u64, count: usize) -> Result<Vec<u8>> {
        let open = self.inner.as_mut().ok_or(ShardError::Closed)?;
        let count = count.min(usize::try_from(u64::MAX - pos).unwrap_or(usize::MAX));
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(count);
        match self.cache.plan(pos, count) {
            ReadPlan::Hit {
                before,
                cached,
                after,
            } => {
                debug!(
                    pos,
                    count,
                    chunk = ?self.cache.chunk_index(),
                    "chunk cache hit"
                );
                let mut short = false;
                if let Some(r) = before {
                    let want = (r.end - r.start) as usize;
                    let part = read_range(&mut open.file, r.start, want).await?;
                    short = part.len() < want;
                    out.extend_from_slice(&part);
                }
                if !short {
                    if let Some(bytes) = self.cache.slice(cached) {
                        out.extend_from_slice(&bytes);
                    }
                    if let Some(r) = after {
                        let part =
                            read_range(&mut open.file, r.start, (r.end - r.start) as usize)
                                .await?;
                        out.extend_from_slice(&part);
                    }
                }
            }
            ReadPlan::Miss { window, tail_index } => {
                let data = Bytes::from(
                    read_range(
                        &mut open.file,
                        window.start,
                        (window.end - window.start) as usize,
                    )
                    .await?,
                );
                let skip = (pos - window.start) as usize;
                if data.len() > skip {
                    let stop = (skip + count).min(data.len());
                    out.extend_from_slice(&data[skip..stop]);
                }
                let tail_start = tail_index * self.cache.chunk_size() as u64;
                let tail_off = (tail_start - window.start) as usize;
                if data.len() > tail_off {
                    self.cache.fill(tail_index, data.slice(tail_off..));
                } else {
                    self.cache.invalidate();
                }
            }
        }

        // Pending writes are visible to reads of this unit, past EOF included.
        if !self.buffer.is_empty() {
            let want_end = pos + count as u64;
            let visible_end = want_end.min(self.buffer.max_end());
            let have_end = pos + out.len() as u64;
            if visible_end > have_end {
                out.resize((visible_end - pos) as usize, 0);
            }
            self.buffer.overlay(pos, &mut out);
        }
        Ok(out)
    }

    /// Writes at the current position and advances it.
    pub async fn write(&mut self, data: Bytes) -> Result<usize> {
        let (pos, appends) = {
            let open = self.inner.as_ref().ok_or(ShardError::Closed)?;
            (open.position, open.mode.appends())
        };
        if data.is_empty() {
            return Ok(0);
        }
        check_range(pos, data.len())?;
        if self.buffer.overlaps(pos, data.len()) {
            self.flush_or_fail().await?;
        }
        let written = self.apply_write(pos, &data).await?;
        let open = self.inner.as_mut().ok_or(ShardError::Closed)?;
        open.position = if appends {
            open.file.metadata().await?.len()
        } else {
            pos + written as u64
        };
        Ok(written)
    }

    /// Positional write. With lazy writes enabled the data is buffered and
    /// applied once the buffer holds more than `chunk_size` bytes.
    ///
    /// In append modes the data is written at once and lands at the end of
    /// the file; `offset` is ignored.
    pub async fn pwrite(&mut self, data: Bytes, offset: u64) -> Result<WriteAck> {
        let appends = self
            .inner
            .as_ref()
            .ok_or(ShardError::Closed)?
            .mode
            .appends();
        if data.is_empty() {
            return Ok(WriteAck {
                written: 0,
                pending: self.buffer.pending_bytes(),
            });
        }
        check_range(offset, data.len())?;
        if !self.options.lazy_writes || appends {
            let written = self.apply_write(offset, &data).await?;
            return Ok(WriteAck {
                written,
                pending: 0,
            });
        }
        if !self.buffer.push(offset, data) {
            return Ok(WriteAck {
                written: 0,
                pending: self.buffer.pending_bytes(),
            });
        }
        let report = self.flush_or_fail().await?;
        Ok(WriteAck {
            written: report.written,
            pending: self.buffer.pending_bytes(),
        })
    }

    /// Applies every buffered write in insertion order.
    pub async fn flush(&mut self) -> Result<FlushReport> {
        if self.inner.is_none() {
            return Err(ShardError::Closed);
        }
        Ok(self.flush_buffer().await)
    }

    async fn flush_or_fail(&mut self) -> Result<FlushReport> {
        let report = self.flush_buffer().await;
        if report.is_complete() {
            Ok(report)
        } else {
            Err(ShardError::PartialFlush {
                failed: report.failed.len(),
                retained_bytes: self.buffer.pending_bytes(),
            })
        }
    }

    async fn flush_buffer(&mut self) -> FlushReport {
        let mut report = FlushReport::default();
        if self.buffer.is_empty() || self.inner.is_none() {
            return report;
        }
        let entries = self.buffer.take();
        debug!(entries = entries.len(), "flushing lazy writes");
        let mut retained: Vec<PendingWrite> = Vec::new();
        for entry in entries {
            match self.apply_write(entry.offset, &entry.data).await {
                Ok(n) => report.written += n,
                Err(err) => {
                    warn!(
                        offset = entry.offset,
                        len = entry.data.len(),
                        "buffered write failed: {err}"
                    );
                    report.failed.push(FailedWrite {
                        offset: entry.offset,
                        len: entry.data.len(),
                        error: err.to_string(),
                    });
                    retained.push(entry);
                }
            }
        }
        self.buffer.restore(retained);
        report
    }

    async fn apply_write(&mut self, offset: u64, data: &[u8]) -> Result<usize> {
        let open = self.inner.as_mut().ok_or(ShardError::Closed)?;
        let written = write_range(&mut open.file, offset, data).await?;
        if open.mode.appends() {
            // the OS placed the bytes at EOF, not at `offset`
            self.cache.invalidate();
        } else {
            self.cache.invalidate_overlapping(offset, written);
        }
        Ok(written)
    }

    pub async fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let end = self.size().await?;
        let open = self.inner.as_mut().ok_or(ShardError::Closed)?;
        open.position = whence.resolve(offset, open.position, end)?;
        Ok(open.position)
    }

    pub fn tell(&self) -> Result<u64> {
        self.inner
            .as_ref()
            .map(|f| f.position)
            .ok_or(ShardError::Closed)
    }

    /// File length as this unit sees it, pending writes included.
    pub async fn size(&self) -> Result<u64> {
        let open = self.inner.as_ref().ok_or(ShardError::Closed)?;
        let on_disk = open.file.metadata().await?.len();
        Ok(on_disk.max(self.buffer.max_end()))
    }
}

impl Drop for LocalFile {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            warn!(
                pending = self.buffer.pending_bytes(),
                "partition unit dropped with unflushed writes"
            );
        }
    }
}
