use crate::archive::RowRange;

/// Threshold below which sharding is pointless: spinning up threads costs
/// more than the parallelism buys.
const MIN_ROWS_PER_WORKER: u64 = 100;

/// Splits a row interval into `workers` contiguous, nearly equal shards.
///
/// Shards are disjoint, cover `[first, first + count)` exactly, and differ
/// in length by at most one row. Small inputs collapse to a single shard.
pub fn partition_rows(range: RowRange, workers: u32) -> Vec<RowRange> {
  if range.count == 0 {
    return Vec::new();
  }
  let workers = u64::from(workers.max(1));
  if range.count < MIN_ROWS_PER_WORKER * workers || workers == 1 {
    return vec![range];
  }

  let base = range.count / workers;
  let extra = range.count % workers;
  let mut shards = Vec::with_capacity(workers as usize);
  let mut first = range.first;
  for shard in 0..workers {
    let count = if shard < extra { base + 1 } else { base };
    shards.push(RowRange::new(first, count));
    first += count as i64;
  }
  shards
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  #[case(1, 1000, 4)]
  #[case(1, 1001, 4)]
  #[case(1, 999, 3)]
  #[case(500, 12345, 6)]
  #[case(1, 100 * 7, 7)]
  fn shards_are_contiguous_equal_and_covering(
    #[case] first: i64,
    #[case] count: u64,
    #[case] workers: u32,
  ) {
    let range = RowRange::new(first, count);
    let shards = partition_rows(range, workers);
    assert_eq!(shards.len(), workers as usize);

    let mut next = first;
    for shard in &shards {
      assert_eq!(shard.first, next);
      next = shard.end();
    }
    assert_eq!(next, range.end());

    let min = shards.iter().map(|s| s.count).min().unwrap();
    let max = shards.iter().map(|s| s.count).max().unwrap();
    assert!(max - min <= 1);
  }

  #[test]
  fn small_inputs_collapse_to_one_shard() {
    let range = RowRange::new(1, 399);
    assert_eq!(partition_rows(range, 4), vec![range]);
  }

  #[test]
  fn empty_range_yields_no_shards() {
    assert_eq!(partition_rows(RowRange::new(1, 0), 4), Vec::new());
  }
}
