//! # Chunk Planner
//!
//! Splits bulk lookups into the minimum number of requests a catalog's
//! per-request limit allows, with sizes as even as possible.

use std::future::Future;

use futures::future::try_join_all;

use crate::error::{ResolveError, Result};

/// Size of each batch when `item_count` items go out in batches of at most
/// `max_per_batch`.
///
/// Uses the minimum number of batches, so `10` items with a limit of `8` go
/// out as `5 + 5`, never `8 + 2`.
pub fn plan_batch_size(item_count: usize, max_per_batch: usize) -> Result<usize> {
    if item_count == 0 {
        return Err(ResolveError::invalid_argument("item count must be positive"));
    }
    if max_per_batch == 0 {
        return Err(ResolveError::invalid_argument(
            "max items per batch must be positive",
        ));
    }

    let batches = item_count.div_ceil(max_per_batch);
    Ok(item_count.div_ceil(batches))
}

/// Sizes of every batch produced for `item_count` items.
///
/// The first `item_count % batches` batches take one extra item, so no two
/// batches differ by more than one.
pub fn batch_sizes(item_count: usize, max_per_batch: usize) -> Result<Vec<usize>> {
    plan_batch_size(item_count, max_per_batch)?;

    let batches = item_count.div_ceil(max_per_batch);
    let base = item_count / batches;
    let extra = item_count % batches;

    Ok((0..batches)
        .map(|index| if index < extra { base + 1 } else { base })
        .collect())
}

/// Runs `request` once per planned batch, concurrently, and concatenates the
/// results. The first failing batch fails the whole call.
pub async fn chunk_and_request<'a, T, R, F, Fut>(
    items: &'a [T],
    max_per_batch: usize,
    request: F,
) -> Result<Vec<R>>
where
    F: Fn(&'a [T]) -> Fut,
    Fut: Future<Output = Result<Vec<R>>>,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    let mut offset = 0;
    for size in batch_sizes(items.len(), max_per_batch)? {
        chunks.push(&items[offset..offset + size]);
        offset += size;
    }

    let responses = try_join_all(chunks.into_iter().map(request)).await?;
    Ok(responses.into_iter().flatten().collect())
}
