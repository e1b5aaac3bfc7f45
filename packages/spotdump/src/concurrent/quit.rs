use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide cooperative cancellation flag.
///
/// Checked at every suspension point: queue push/pop retries and worker loop
/// iterations. Once set it never clears for the lifetime of a run.
#[derive(Debug, Clone, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_set(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clones_share_the_flag() {
    let quit = QuitFlag::new();
    let other = quit.clone();
    assert!(!other.is_set());
    quit.set();
    assert!(other.is_set());
  }
}
