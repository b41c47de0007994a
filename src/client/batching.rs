//! Batch partitioning for Exploit Session dispatch (§4.3 step 5, §8
//! invariant 6).

use crate::config::client_schema::BatchSpec;

/// Partitions `items` into batches per `spec`. `count` mode distributes the
/// remainder into the first few batches (near-equal sizes, difference <= 1);
/// `size` mode groups consecutive items into fixed-size batches except the
/// last, which may be shorter. `count > n` collapses to `n` single-item
/// batches (empty batches are discarded either way).
pub fn partition<T: Clone>(items: &[T], spec: &BatchSpec) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    if let Some(size) = spec.size {
        let size = size.max(1);
        return items.chunks(size).map(<[T]>::to_vec).collect();
    }
    let count = spec.count.unwrap_or(1).max(1).min(items.len());
    let n = items.len();
    let base = n / count;
    let remainder = n % count;

    let mut batches = Vec::with_capacity(count);
    let mut offset = 0;
    for i in 0..count {
        let size = base + usize::from(i < remainder);
        if size == 0 {
            continue;
        }
        batches.push(items[offset..offset + size].to_vec());
        offset += size;
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_count(count: usize, wait: f64) -> BatchSpec {
        BatchSpec {
            count: Some(count),
            size: None,
            wait,
        }
    }

    fn spec_size(size: usize, wait: f64) -> BatchSpec {
        BatchSpec {
            count: None,
            size: Some(size),
            wait,
        }
    }

    #[test]
    fn s4_batching_scenario() {
        // S4: 10 targets, batches={count:3, wait:2} -> sizes (4,3,3).
        let items: Vec<usize> = (0..10).collect();
        let batches = partition(&items, &spec_count(3, 2.0));
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        let flattened: Vec<usize> = batches.into_iter().flatten().collect();
        assert_eq!(flattened, items);
    }

    #[test]
    fn size_mode_groups_consecutive_with_short_last_batch() {
        let items: Vec<usize> = (0..10).collect();
        let batches = partition(&items, &spec_size(4, 0.0));
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn count_greater_than_n_collapses_to_n_single_item_batches() {
        let items: Vec<usize> = (0..3).collect();
        let batches = partition(&items, &spec_count(10, 0.0));
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn empty_items_yield_no_batches() {
        let items: Vec<usize> = Vec::new();
        assert!(partition(&items, &spec_count(3, 1.0)).is_empty());
    }
}
