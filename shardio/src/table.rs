//! Partition table: the ordered unit handles and the offset arithmetic that
//! maps a logical byte range onto them.

use std::ops::Range;

use crate::error::{Result, ShardError};
use crate::partition::PartitionRef;

/// Byte ownership of the partitions of one file.
///
/// Partition `i` owns `[i * bytes_per_partition, (i + 1) * bytes_per_partition)`
/// clipped to `file_size`. Trailing partitions may own nothing when the file
/// is small compared to the partition count. Offsets past the end of the file
/// belong to the last partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionLayout {
    pub file_size: u64,
    pub partition_count: usize,
    pub bytes_per_partition: u64,
}

/// Part of a logical range that falls into one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSpan {
    pub index: usize,
    /// File offset where the range enters the partition.
    pub offset: u64,
    /// Same position relative to the partition start.
    pub local_offset: u64,
    pub len: usize,
}

impl PartitionLayout {
    pub fn build(file_size: u64, partition_count: usize) -> Result<Self> {
        if partition_count == 0 {
            return Err(ShardError::invalid("partition_count must be greater than zero"));
        }
        Ok(Self {
            file_size,
            partition_count,
            bytes_per_partition: file_size.div_ceil(partition_count as u64),
        })
    }

    fn last(&self) -> usize {
        self.partition_count - 1
    }

    pub fn range(&self, index: usize) -> Range<u64> {
        let bpp = self.bytes_per_partition;
        let start = (index as u64).saturating_mul(bpp).min(self.file_size);
        let end = (index as u64).saturating_add(1).saturating_mul(bpp).min(self.file_size);
        start..end
    }

    pub fn locate(&self, offset: u64) -> usize {
        if self.bytes_per_partition == 0 {
            return 0;
        }
        let index = offset / self.bytes_per_partition;
        usize::try_from(index).map_or(self.last(), |i| i.min(self.last()))
    }

    /// Splits `[offset, offset + len)` into per-partition spans in index order.
    /// The range is cut short at `u64::MAX`.
    pub fn spans(&self, offset: u64, len: usize) -> Vec<PartitionSpan> {
        let mut out = Vec::new();
        let len = len.min(usize::try_from(u64::MAX - offset).unwrap_or(usize::MAX));
        if len == 0 {
            return out;
        }
        let bpp = self.bytes_per_partition;
        if bpp == 0 {
            out.push(PartitionSpan {
                index: 0,
                offset,
                local_offset: offset,
                len,
            });
            return out;
        }

        let mut pos = offset;
        let mut remaining = len as u64;
        while remaining > 0 {
            let index = self.locate(pos);
            let start = index as u64 * bpp;
            let take = if index == self.last() {
                remaining
            } else {
                (start + bpp - pos).min(remaining)
            };
            out.push(PartitionSpan {
                index,
                offset: pos,
                local_offset: pos - start,
                len: take as usize,
            });
            pos += take;
            remaining -= take;
        }
        out
    }
}

/// Layout plus one handle per partition.
#[derive(Clone)]
pub struct PartitionTable {
    layout: PartitionLayout,
    partitions: Vec<PartitionRef>,
}

impl PartitionTable {
    pub fn new(layout: PartitionLayout, partitions: Vec<PartitionRef>) -> Result<Self> {
        if partitions.len() != layout.partition_count {
            return Err(ShardError::invalid(format!(
                "layout has {} partitions but {} handles were given",
                layout.partition_count,
                partitions.len()
            )));
        }
        Ok(Self { layout, partitions })
    }

    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    pub fn partition(&self, index: usize) -> Option<&PartitionRef> {
        self.partitions.get(index)
    }

    pub fn partitions(&self) -> &[PartitionRef] {
        &self.partitions
    }

    /// Same handles over a new file size.
    pub fn relayout(&self, file_size: u64) -> Result<Self> {
        Ok(Self {
            layout: PartitionLayout::build(file_size, self.partitions.len())?,
            partitions: self.partitions.clone(),
        })
    }
}
