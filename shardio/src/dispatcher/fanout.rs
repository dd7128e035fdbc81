//! Per-partition fan-out and in-order gather.

use bytes::Bytes;
use futures::future::{join_all, try_join_all};
use tracing::{debug, warn};

use crate::config::OpenMode;
use crate::error::{Result, ShardError};
use crate::partition::{FlushReport, PartitionRef};
use crate::table::{PartitionSpan, PartitionTable};

fn unit<'a>(table: &'a PartitionTable, span: &PartitionSpan) -> Result<&'a PartitionRef> {
    table
        .partition(span.index)
        .ok_or_else(|| ShardError::invalid(format!("no partition {}", span.index)))
}

/// Reads `[offset, offset + size)` with one concurrent positional read per
/// touched partition. Legs are joined in partition order; a short leg ends
/// the result.
pub(crate) async fn gather_read(
    table: &PartitionTable,
    offset: u64,
    size: usize,
) -> Result<Vec<u8>> {
    let spans = table.layout().spans(offset, size);
    let legs = spans.iter().map(|span| async move {
        debug!(partition = span.index, offset = span.offset, len = span.len, "read leg");
        unit(table, span)?
            .pread(span.len, span.offset)
            .await
            .inspect_err(|err| {
                warn!(partition = span.index, offset = span.offset, "read leg failed: {err}")
            })
    });
    let parts = try_join_all(legs).await?;

    let mut out = Vec::with_capacity(size);
    for (span, part) in spans.iter().zip(parts) {
        let short = part.len() < span.len;
        out.extend_from_slice(&part);
        if short {
            break;
        }
    }
    Ok(out)
}

/// Writes `data` at `offset`, split across the touched partitions. Returns the
/// number of bytes the partitions accepted.
pub(crate) async fn gather_write(
    table: &PartitionTable,
    offset: u64,
    data: Bytes,
) -> Result<usize> {
    if offset.checked_add(data.len() as u64).is_none() {
        return Err(ShardError::invalid(format!(
            "write of {} bytes at {offset} overflows the file offset",
            data.len()
        )));
    }
    let spans = table.layout().spans(offset, data.len());
    let legs = spans.iter().map(|span| {
        let start = (span.offset - offset) as usize;
        let slice = data.slice(start..start + span.len);
        async move {
            debug!(partition = span.index, offset = span.offset, len = span.len, "write leg");
            unit(table, span)?
                .pwrite(slice, span.offset)
                .await
                .inspect_err(|err| {
                    warn!(partition = span.index, offset = span.offset, "write leg failed: {err}")
                })?;
            Ok::<_, ShardError>(span.len)
        }
    });
    Ok(try_join_all(legs).await?.into_iter().sum())
}

/// Appends `data` through partition 0 as one write. Every unit shares the
/// file, and the OS places appended bytes at its end whatever the offset.
pub(crate) async fn append_write(table: &PartitionTable, data: Bytes) -> Result<usize> {
    if data.is_empty() {
        return Ok(0);
    }
    let len = data.len();
    let unit = table
        .partition(0)
        .ok_or_else(|| ShardError::invalid("no partition 0"))?;
    debug!(len, "append leg");
    unit.pwrite(data, 0)
        .await
        .inspect_err(|err| warn!(partition = 0, "append leg failed: {err}"))?;
    Ok(len)
}

pub(crate) async fn flush_all(table: &PartitionTable) -> Result<FlushReport> {
    let reports = try_join_all(table.partitions().iter().map(|p| p.flush())).await?;
    let mut merged = FlushReport::default();
    for report in reports {
        merged.merge(report);
    }
    Ok(merged)
}

/// Closes every partition. All are attempted; the first error is returned.
pub(crate) async fn close_all(partitions: &[PartitionRef]) -> Result<()> {
    let results = join_all(partitions.iter().map(|p| p.close())).await;
    let mut first = None;
    for (index, res) in results.into_iter().enumerate() {
        if let Err(err) = res {
            warn!(partition = index, "close failed: {err}");
            first.get_or_insert(err);
        }
    }
    first.map_or(Ok(()), Err)
}

/// Opens `path` on every partition concurrently and returns the file size
/// and initial position seen by partition 0. On failure every partition is
/// closed again.
pub(crate) async fn open_all(
    partitions: &[PartitionRef],
    path: &str,
    mode: OpenMode,
) -> Result<(u64, u64)> {
    let results = join_all(partitions.iter().map(|p| p.open(path, mode))).await;
    let failed = results
        .into_iter()
        .enumerate()
        .find_map(|(index, res)| res.err().map(|err| (index, err)));

    let outcome = match failed {
        Some((partition, err)) => Err(ShardError::OpenFailure {
            partition,
            path: path.into(),
            source: Box::new(err),
        }),
        None => match partitions.first() {
            Some(first) => probe(first).await,
            None => Err(ShardError::invalid("no partitions to open")),
        },
    };
    if let Err(err) = &outcome {
        warn!(path, "opening partitions failed, closing them: {err}");
        if let Err(close_err) = close_all(partitions).await {
            warn!("closing partitions after failed open: {close_err}");
        }
    }
    outcome
}

async fn probe(unit: &PartitionRef) -> Result<(u64, u64)> {
    Ok((unit.size().await?, unit.tell().await?))
}
