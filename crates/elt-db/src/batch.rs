//! Shared batching constants and the write-count type every layer returns
//! (§4.3 "Observability": counts are authoritative even in per-row fallback).

pub const DEFAULT_BATCH_SIZE: usize = 1_000;
pub const MAX_BATCH_SIZE: usize = 10_000;
const PROGRESS_EVERY: u64 = 5_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub written: u64,
    pub failed: u64,
}

impl WriteCounts {
    pub fn merge(&mut self, other: WriteCounts) {
        self.written += other.written;
        self.failed += other.failed;
    }
}

pub fn clamp_batch_size(requested: usize) -> usize {
    requested.clamp(1, MAX_BATCH_SIZE)
}

/// Emits a progress log every [`PROGRESS_EVERY`] rows written, and once more
/// at the end if the last log didn't land on a multiple.
pub fn log_progress(table: &str, written: u64, total: u64) {
    if written % PROGRESS_EVERY == 0 || written == total {
        tracing::info!(table, written, total, "medallion write progress");
    }
}

/// Splits items deterministically, clamping the caller's requested size into
/// `[1, MAX_BATCH_SIZE]` (§4.3 "batches of configurable size (default 1,000;
/// max 10,000)").
pub fn write_in_batches<T>(items: &[T], requested_batch_size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(clamp_batch_size(requested_batch_size))
}

/// Generic batch-then-retry-once-then-per-row-fallback helper used by every
/// layer: `insert_batch` runs against a chunk; on failure it is retried once
/// whole, and if still failing each row goes through `insert_row`
/// individually, with failures counted rather than propagated.
pub async fn write_with_fallback<T, B, R>(
    items: &[T],
    batch_size: usize,
    table: &str,
    mut insert_batch: B,
    mut insert_row: R,
) -> WriteCounts
where
    B: FnMut(&[T]) -> futures_util::future::BoxFuture<'_, anyhow::Result<()>>,
    R: FnMut(&T) -> futures_util::future::BoxFuture<'_, anyhow::Result<()>>,
{
    let mut counts = WriteCounts::default();
    let total = items.len() as u64;

    for chunk in write_in_batches(items, batch_size) {
        if (insert_batch)(chunk).await.is_ok() {
            counts.written += chunk.len() as u64;
            log_progress(table, counts.written, total);
            continue;
        }

        tracing::warn!(table, rows = chunk.len(), "batch insert failed, retrying once");
        if (insert_batch)(chunk).await.is_ok() {
            counts.written += chunk.len() as u64;
            log_progress(table, counts.written, total);
            continue;
        }

        tracing::warn!(table, rows = chunk.len(), "batch retry failed, falling back to per-row");
        for row in chunk {
            match (insert_row)(row).await {
                Ok(()) => counts.written += 1,
                Err(err) => {
                    counts.failed += 1;
                    tracing::error!(table, error = %err, "row insert failed");
                }
            }
            log_progress(table, counts.written, total);
        }
    }

    counts
}
