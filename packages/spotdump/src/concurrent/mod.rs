pub mod locked;
pub mod queue;
pub mod quit;

use crate::error::{DumpError, Result};
use self::quit::QuitFlag;
use std::thread::ScopedJoinHandle;

/// Joins a scoped worker, re-raising its panic in the coordinator.
pub fn join_thread<T>(handle: ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
  match handle.join() {
    Ok(result) => result,
    Err(payload) => std::panic::resume_unwind(payload),
  }
}

/// Records a worker failure, sets the quit flag, and keeps the most
/// informative error: a `Cancelled` from a sibling that merely observed the
/// quit flag never masks the root cause.
pub fn note_err(first: &mut Option<DumpError>, err: DumpError, quit: &QuitFlag) {
  quit.set();
  let replace = match first {
    None => true,
    Some(DumpError::Cancelled) => !matches!(err, DumpError::Cancelled),
    Some(_) => false,
  };
  if replace {
    *first = Some(err);
  }
}
