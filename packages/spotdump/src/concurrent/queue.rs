use crate::concurrent::quit::QuitFlag;
use crate::error::{DumpError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use std::time::Duration;

/// Default retry interval for full-queue pushes and empty-queue pops.
pub const QUEUE_TIMEOUT: Duration = Duration::from_millis(200);

/// Bounded multi-producer queue with a sealable end-of-stream and cooperative
/// cancellation.
///
/// `push` retries on a full queue until the quit flag is observed; `pop`
/// blocks until an item arrives, the queue is sealed and drained, or the quit
/// flag is observed. Sealing is expressed through ownership: dropping (or
/// explicitly sealing) every sender ends the stream.
pub fn channel<T>(cap: usize, timeout: Duration, quit: QuitFlag) -> (QueueSender<T>, QueueReceiver<T>) {
  let (tx, rx) = bounded(cap);
  (
    QueueSender {
      tx,
      timeout,
      quit: quit.clone(),
    },
    QueueReceiver { rx, timeout, quit },
  )
}

#[derive(Debug)]
pub struct QueueSender<T> {
  tx: Sender<T>,
  timeout: Duration,
  quit: QuitFlag,
}

impl<T> Clone for QueueSender<T> {
  fn clone(&self) -> Self {
    Self {
      tx: self.tx.clone(),
      timeout: self.timeout,
      quit: self.quit.clone(),
    }
  }
}

impl<T> QueueSender<T> {
  pub fn push(&self, item: T) -> Result<()> {
    let mut item = item;
    loop {
      if self.quit.is_set() {
        return Err(DumpError::Cancelled);
      }
      match self.tx.send_timeout(item, self.timeout) {
        Ok(()) => return Ok(()),
        Err(SendTimeoutError::Timeout(returned)) => item = returned,
        Err(SendTimeoutError::Disconnected(_)) => return Err(DumpError::Cancelled),
      }
    }
  }

  /// Marks this producer as finished. The stream ends once every sender has
  /// been sealed or dropped.
  pub fn seal(self) {}
}

#[derive(Debug)]
pub struct QueueReceiver<T> {
  rx: Receiver<T>,
  timeout: Duration,
  quit: QuitFlag,
}

impl<T> QueueReceiver<T> {
  /// Next item, or `None` once the queue is sealed and drained.
  pub fn pop(&self) -> Result<Option<T>> {
    loop {
      if self.quit.is_set() {
        return Err(DumpError::Cancelled);
      }
      match self.rx.recv_timeout(self.timeout) {
        Ok(item) => return Ok(Some(item)),
        Err(RecvTimeoutError::Timeout) => {}
        Err(RecvTimeoutError::Disconnected) => return Ok(None),
      }
    }
  }
}
