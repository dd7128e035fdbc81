//! Lazy write buffer: positional writes queued until a size threshold.

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub offset: u64,
    pub data: Bytes,
}

impl PendingWrite {
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedWrite {
    pub offset: u64,
    pub len: usize,
    pub error: String,
}

/// Outcome of draining the buffer into the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Bytes applied to the file.
    pub written: usize,
    /// Entries that failed, in buffer order. They remain buffered.
    pub failed: Vec<FailedWrite>,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: FlushReport) {
        self.written += other.written;
        self.failed.extend(other.failed);
    }
}

#[derive(Debug, Default)]
pub struct WriteBuffer {
    entries: Vec<PendingWrite>,
    bytes: usize,
    threshold: usize,
}

impl WriteBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            entries: Vec::new(),
            bytes: 0,
            threshold,
        }
    }

    /// Queues a write. Returns true once the buffered byte count exceeds the
    /// threshold and the buffer should be flushed.
    pub fn push(&mut self, offset: u64, data: Bytes) -> bool {
        self.bytes += data.len();
        self.entries.push(PendingWrite { offset, data });
        self.bytes > self.threshold
    }

    pub fn pending_bytes(&self) -> usize {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns every entry in insertion order.
    pub fn take(&mut self) -> Vec<PendingWrite> {
        self.bytes = 0;
        std::mem::take(&mut self.entries)
    }

    /// Puts entries that could not be applied back at the front of the queue.
    pub fn restore(&mut self, mut failed: Vec<PendingWrite>) {
        self.bytes += failed.iter().map(|w| w.data.len()).sum::<usize>();
        failed.append(&mut self.entries);
        self.entries = failed;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }

    /// Whether a pending write touches `[offset, offset + len)`.
    pub fn overlaps(&self, offset: u64, len: usize) -> bool {
        let end = offset + len as u64;
        self.entries.iter().any(|w| w.offset < end && w.end() > offset)
    }

    /// Highest file offset touched by a pending write.
    pub fn max_end(&self) -> u64 {
        self.entries.iter().map(PendingWrite::end).max().unwrap_or(0)
    }

    /// Applies pending writes, in order, onto `buf` which holds the file bytes
    /// starting at `offset`.
    pub fn overlay(&self, offset: u64, buf: &mut [u8]) {
        let end = offset + buf.len() as u64;
        for w in &self.entries {
            let start = w.offset.max(offset);
            let stop = w.end().min(end);
            if start >= stop {
                continue;
            }
            let src = &w.data[(start - w.offset) as usize..(stop - w.offset) as usize];
            buf[(start - offset) as usize..(stop - offset) as usize].copy_from_slice(src);
        }
    }
}
