use std::io;
use thiserror::Error;

/// Error taxonomy of the whole pipeline.
///
/// Worker threads and background mergers return these through their join
/// handles; the coordinator keeps the first failure and sets the quit flag so
/// sibling threads exit at their next suspension point.
#[derive(Debug, Error)]
pub enum DumpError {
  #[error("I/O failure in {op}: {source}")]
  Io {
    op: &'static str,
    #[source]
    source: io::Error,
  },

  #[error("cannot pack an empty read")]
  Empty,

  #[error("read of {0} bases does not fit the 16-bit length prefix")]
  TooLong(usize),

  #[error("invalid data: {0}")]
  DataInvalid(String),

  #[error("no bases stored for spot {spot_id} read {read_id}")]
  NotFound { spot_id: i64, read_id: u32 },

  #[error("cancelled")]
  Cancelled,

  #[error("resource exhausted: {0}")]
  ResourceExhausted(String),

  #[error("{0}")]
  Usage(String),

  #[error("unsupported accession: {0}")]
  Unsupported(String),
}

pub type Result<T> = std::result::Result<T, DumpError>;

impl DumpError {
  pub fn io(op: &'static str, source: io::Error) -> Self {
    Self::Io { op, source }
  }

  pub fn not_found(key: crate::codec::key::Key) -> Self {
    Self::NotFound {
      spot_id: key.spot_id(),
      read_id: key.read_id(),
    }
  }

  /// Process exit code this error maps to. Bad arguments and unsupported
  /// accession kinds exit with 3, everything else with 1.
  pub fn exit_code(&self) -> i32 {
    match self {
      Self::Usage(_) | Self::Unsupported(_) => 3,
      _ => 1,
    }
  }
}

/// Attaches an operation name to `std::io` errors on their way into the
/// pipeline error type.
pub trait IoContext<T> {
  fn op(self, op: &'static str) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
  fn op(self, op: &'static str) -> Result<T> {
    self.map_err(|source| DumpError::Io { op, source })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn usage_and_unsupported_exit_with_3() {
    assert_eq!(DumpError::Usage("bad flags".into()).exit_code(), 3);
    assert_eq!(DumpError::Unsupported("PACBIO".into()).exit_code(), 3);
    assert_eq!(DumpError::Cancelled.exit_code(), 1);
    assert_eq!(
      DumpError::io("test", io::Error::new(io::ErrorKind::Other, "x")).exit_code(),
      1
    );
  }
}
