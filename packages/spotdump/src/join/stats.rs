use std::ops::AddAssign;

/// Per-worker join counters, summed by the coordinator when the workers are
/// joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
  pub spots_read: u64,
  pub reads_read: u64,
  pub reads_written: u64,
  pub reads_zero_length: u64,
  pub reads_technical: u64,
  pub reads_too_short: u64,
  pub reads_invalid: u64,
}

impl AddAssign for JoinStats {
  fn add_assign(&mut self, other: Self) {
    self.spots_read += other.spots_read;
    self.reads_read += other.reads_read;
    self.reads_written += other.reads_written;
    self.reads_zero_length += other.reads_zero_length;
    self.reads_technical += other.reads_technical;
    self.reads_too_short += other.reads_too_short;
    self.reads_invalid += other.reads_invalid;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn add_assign_sums_all_counters() {
    let mut total = JoinStats {
      spots_read: 1,
      reads_read: 2,
      ..JoinStats::default()
    };
    total += JoinStats {
      spots_read: 10,
      reads_written: 5,
      reads_too_short: 1,
      ..JoinStats::default()
    };
    assert_eq!(total.spots_read, 11);
    assert_eq!(total.reads_read, 2);
    assert_eq!(total.reads_written, 5);
    assert_eq!(total.reads_too_short, 1);
  }
}
