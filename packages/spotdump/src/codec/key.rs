/// Composite lookup key: `(spot_id << 1) | (read_id == 2)`.
///
/// Keys order first by spot id, then by read id, so both mates of a spot are
/// adjacent in the sorted lookup and the second mate is always `key + 1`.
/// The encoding only holds for spots with at most two reads; spots with more
/// are rejected by the sequence-table iterator before a key is ever formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(u64);

impl Key {
  pub fn new(spot_id: i64, read_id: u32) -> Self {
    let mut key = (spot_id as u64) << 1;
    if read_id == 2 {
      key |= 1;
    }
    Self(key)
  }

  pub fn from_raw(raw: u64) -> Self {
    Self(raw)
  }

  pub fn raw(self) -> u64 {
    self.0
  }

  pub fn spot_id(self) -> i64 {
    (self.0 >> 1) as i64
  }

  pub fn read_id(self) -> u32 {
    if self.0 & 1 == 1 { 2 } else { 1 }
  }

  /// Seek equality: a requested "read 1" key also matches its "read 2"
  /// sibling, so a single seek lands on whichever mate of the spot is stored.
  pub fn matches(self, found: Key) -> bool {
    self == found || (self.0 & 1 == 0 && found.0 == self.0 + 1)
  }
}
