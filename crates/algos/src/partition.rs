use std::ops::Range;

/// Splits `0..item_count` into contiguous ranges whose summed weights are
/// roughly `max_weight` each.
///
/// The split is greedy: it sweeps the items once and closes the current
/// range as soon as its summed weight crosses `max_weight`; the trailing
/// range is emitted as-is. The phases of the clustering engine use the
/// vertex degree as the weight, so every spawned task touches a comparable
/// number of edges no matter how skewed the degree distribution is.
pub fn greedy_degree_partition<F>(
    item_count: usize,
    max_weight: usize,
    weight: F,
) -> Vec<Range<usize>>
where
    F: Fn(usize) -> usize,
{
    let mut partitions = Vec::new();

    let mut batch_weight = 0_usize;
    let mut batch_start = 0_usize;

    for item in 0..item_count {
        batch_weight += weight(item);

        if batch_weight > max_weight {
            batch_weight = 0;
            partitions.push(batch_start..item + 1);
            batch_start = item + 1;
        }
    }

    if batch_start < item_count {
        partitions.push(batch_start..item_count);
    }

    partitions
}
