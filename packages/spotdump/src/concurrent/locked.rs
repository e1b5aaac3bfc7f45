use std::sync::atomic::{AtomicU64, Ordering};

/// Shared 64-bit counter with atomic get/set semantics.
#[derive(Debug, Default)]
pub struct LockedValue(AtomicU64);

impl LockedValue {
  pub fn new(value: u64) -> Self {
    Self(AtomicU64::new(value))
  }

  pub fn get(&self) -> u64 {
    self.0.load(Ordering::SeqCst)
  }

  pub fn set(&self, value: u64) {
    self.0.store(value, Ordering::SeqCst);
  }

  pub fn add(&self, delta: u64) -> u64 {
    self.0.fetch_add(delta, Ordering::SeqCst) + delta
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn get_set_add() {
    let value = LockedValue::new(7);
    assert_eq!(value.get(), 7);
    value.set(40);
    assert_eq!(value.add(2), 42);
    assert_eq!(value.get(), 42);
  }
}
