//! Single-entry read-ahead chunk cache of a partition unit.

use std::ops::Range;

use bytes::Bytes;

/// How a read of `[pos, pos + len)` is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPlan {
    /// The cached chunk overlaps the request. `before` and `after` are read
    /// from the file, `cached` is copied out of the cache.
    Hit {
        before: Option<Range<u64>>,
        cached: Range<u64>,
        after: Option<Range<u64>>,
    },
    /// No overlap. Read `window` from the file and cache chunk `tail_index`,
    /// the last chunk of the window.
    Miss { window: Range<u64>, tail_index: u64 },
}

#[derive(Debug, Clone)]
struct CachedChunk {
    index: u64,
    bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct ChunkCache {
    chunk_size: usize,
    entry: Option<CachedChunk>,
}

impl ChunkCache {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            entry: None,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_index(&self) -> Option<u64> {
        self.entry.as_ref().map(|e| e.index)
    }

    fn chunk_start(&self, index: u64) -> u64 {
        index * self.chunk_size as u64
    }

    /// File range held by the cache. Shorter than a chunk if the chunk met EOF.
    pub fn range(&self) -> Option<Range<u64>> {
        self.entry.as_ref().map(|e| {
            let start = self.chunk_start(e.index);
            start..start + e.bytes.len() as u64
        })
    }

    /// Ranges end at `u64::MAX` at the latest.
    pub fn plan(&self, pos: u64, len: usize) -> ReadPlan {
        let end = pos.saturating_add(len as u64);
        if let Some(cached) = self.range() {
            if pos < cached.end && end > cached.start {
                let before = (pos < cached.start).then(|| pos..cached.start);
                let after = (end > cached.end).then(|| cached.end..end);
                return ReadPlan::Hit {
                    before,
                    cached: pos.max(cached.start)..end.min(cached.end),
                    after,
                };
            }
        }
        let cs = self.chunk_size as u64;
        // First chunk boundary strictly past the request end.
        let tail_index = end / cs;
        let tail_start = tail_index * cs;
        ReadPlan::Miss {
            window: pos.min(tail_start)..tail_start.saturating_add(cs),
            tail_index,
        }
    }

    /// Bytes of `range`, which must lie within `self.range()`.
    pub fn slice(&self, range: Range<u64>) -> Option<Bytes> {
        let entry = self.entry.as_ref()?;
        let start = self.chunk_start(entry.index);
        if range.start < start || range.end > start + entry.bytes.len() as u64 {
            return None;
        }
        Some(
            entry
                .bytes
                .slice((range.start - start) as usize..(range.end - start) as usize),
        )
    }

    /// Replaces the cached chunk. Empty chunks are not cached.
    pub fn fill(&mut self, index: u64, bytes: Bytes) {
        if bytes.is_empty() {
            self.entry = None;
            return;
        }
        debug_assert!(bytes.len() <= self.chunk_size);
        self.entry = Some(CachedChunk { index, bytes });
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Drops the cached chunk if `[offset, offset + len)` touches its chunk.
    pub fn invalidate_overlapping(&mut self, offset: u64, len: usize) -> bool {
        let Some(index) = self.chunk_index() else {
            return false;
        };
        let start = self.chunk_start(index);
        let end = start + self.chunk_size as u64;
        if len > 0 && offset < end && offset.saturating_add(len as u64) > start {
            self.entry = None;
            return true;
        }
        false
    }
}
