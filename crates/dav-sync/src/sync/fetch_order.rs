//! Fetch order across remote tables
//!
//! Sequential tables are fetched page after page in their configured order.
//! Parallel tables get their first page in their natural position; once every
//! parallel table has started, their remaining pages are fetched round-robin
//! before the walk continues.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// First occurrence of every id, in input order
fn dedup<T: Copy + Eq + Hash>(ids: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Compute the order in which table pages are fetched
///
/// Every id in `collection_ids` appears exactly `page_counts[id]` times in the
/// result (missing entries count as 0 pages). Ids in `parallel_ids` that are not
/// collections are ignored, as are repeated ids in either list.
pub fn fetch_order<T: Copy + Eq + Hash>(
    collection_ids: &[T],
    parallel_ids: &[T],
    page_counts: &HashMap<T, u32>,
) -> Vec<T> {
    let collections = dedup(collection_ids);
    let parallel: Vec<T> = dedup(parallel_ids)
        .into_iter()
        .filter(|id| collections.contains(id))
        .collect();
    let pages = |id: &T| page_counts.get(id).copied().unwrap_or(0);

    let mut reserved: Vec<u32> = parallel
        .iter()
        .map(|id| pages(id).saturating_sub(1))
        .collect();
    // A parallel table without pages never gets emitted, so it has nothing to wait for
    let mut started: HashSet<T> = parallel
        .iter()
        .copied()
        .filter(|id| pages(id) == 0)
        .collect();
    let mut interleaved = parallel.is_empty();
    let mut order = Vec::new();

    for id in &collections {
        if parallel.contains(id) {
            if pages(id) > 0 {
                order.push(*id);
                started.insert(*id);
            }
        } else {
            order.extend(std::iter::repeat_n(*id, pages(id) as usize));
        }

        if !interleaved && started.len() == parallel.len() {
            interleaved = true;
            round_robin(&parallel, &mut reserved, &mut order);
        }
    }

    order
}

/// Emit one page per parallel table per round until all reservations are spent
fn round_robin<T: Copy>(parallel: &[T], reserved: &mut [u32], order: &mut Vec<T>) {
    loop {
        let mut emitted = false;
        for (id, remaining) in parallel.iter().zip(reserved.iter_mut()) {
            if *remaining > 0 {
                order.push(*id);
                *remaining -= 1;
                emitted = true;
            }
        }
        if !emitted {
            break;
        }
    }
}
