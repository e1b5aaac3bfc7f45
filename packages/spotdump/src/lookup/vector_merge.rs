use crate::codec::key::Key;
use crate::concurrent::queue::{QueueReceiver, QueueSender};
use crate::context::RunContext;
use crate::error::{IoContext, Result};
use crate::lookup::record;
use crate::lookup::subvec::SortedSubVector;
use log::debug;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Background consumer of sorted sub-vectors.
///
/// Accumulates incoming sub-vectors until the batch reaches the merge-batch
/// target (4 × mem_limit by default), k-way merges the batch through a
/// min-heap and streams the run to a freshly registered temp file, which is
/// handed to the file-merger. When the producer side seals and the queue
/// drains, the partial batch is flushed and the downstream queue sealed.
pub fn run_vector_merger(
  rx: &QueueReceiver<SortedSubVector>,
  tx: QueueSender<PathBuf>,
  ctx: &RunContext,
  batch_bytes: usize,
  buf_size: usize,
) -> Result<u64> {
  let mut batch: Vec<SortedSubVector> = Vec::new();
  let mut pending = 0usize;
  let mut file_seq = 0u32;
  let mut records_out = 0u64;

  while let Some(sub) = rx.pop()? {
    pending += sub.bytes();
    batch.push(sub);
    if pending >= batch_bytes {
      records_out += flush_batch(&mut batch, &tx, ctx, buf_size, &mut file_seq)?;
      pending = 0;
    }
  }
  records_out += flush_batch(&mut batch, &tx, ctx, buf_size, &mut file_seq)?;

  debug!("vector-merger: {records_out} records over {file_seq} temp files");
  tx.seal();
  Ok(records_out)
}

struct HeadEntry {
  key: Key,
  src: usize,
}

impl PartialEq for HeadEntry {
  fn eq(&self, other: &Self) -> bool {
    self.key == other.key && self.src == other.src
  }
}

impl Eq for HeadEntry {}

impl Ord for HeadEntry {
  fn cmp(&self, other: &Self) -> Ordering {
    // reversed for a min-heap; ties break on source index to keep the
    // merge stable
    (other.key, other.src).cmp(&(self.key, self.src))
  }
}

impl PartialOrd for HeadEntry {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

fn flush_batch(
  batch: &mut Vec<SortedSubVector>,
  tx: &QueueSender<PathBuf>,
  ctx: &RunContext,
  buf_size: usize,
  file_seq: &mut u32,
) -> Result<u64> {
  if batch.is_empty() {
    return Ok(0);
  }

  let path = ctx.temp_path(&format!("sub_{}.dat", *file_seq));
  *file_seq += 1;
  ctx.cleanup.register_file(&path);

  let file = File::create(&path).op("creating merge temp file")?;
  let mut writer = BufWriter::with_capacity(buf_size, file);

  let mut sources: Vec<std::vec::IntoIter<(Key, Vec<u8>)>> = batch
    .drain(..)
    .map(|sub| sub.entries.into_iter())
    .collect();

  let mut heap = BinaryHeap::new();
  let mut heads: Vec<Option<Vec<u8>>> = Vec::with_capacity(sources.len());
  for (src, source) in sources.iter_mut().enumerate() {
    match source.next() {
      Some((key, packed)) => {
        heap.push(HeadEntry { key, src });
        heads.push(Some(packed));
      }
      None => heads.push(None),
    }
  }

  let mut written = 0u64;
  while let Some(HeadEntry { key, src }) = heap.pop() {
    let packed = heads[src].take().unwrap_or_default();
    record::write_record(&mut writer, key, &packed)?;
    written += 1;
    if let Some((next_key, next_packed)) = sources[src].next() {
      heap.push(HeadEntry { key: next_key, src });
      heads[src] = Some(next_packed);
    }
  }

  writer.flush().op("flushing merge temp file")?;
  debug!("vector-merger: flushed {written} records to '{}'", path.display());
  tx.push(path)?;
  Ok(written)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::concurrent::queue;
  use crate::concurrent::quit::QuitFlag;
  use crate::lookup::subvec::SubVector;
  use pretty_assertions::assert_eq;
  use std::io::BufReader;
  use std::time::Duration;

  fn packed(bases: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    crate::codec::pack::pack(bases, &mut out).unwrap();
    out
  }

  fn read_all_keys(path: &PathBuf) -> Vec<Key> {
    let mut reader = BufReader::new(File::open(path).unwrap());
    let mut keys = Vec::new();
    let mut buf = Vec::new();
    while let Some(key) = record::read_record(&mut reader, &mut buf).unwrap() {
      keys.push(key);
    }
    keys
  }

  #[test]
  fn merges_sub_vectors_into_sorted_temp_files() {
    let root = tempfile::tempdir().unwrap();
    let ctx = RunContext::create(root.path()).unwrap();
    let quit = QuitFlag::new();

    let (sub_tx, sub_rx) = queue::channel(4, Duration::from_millis(20), quit.clone());
    let (file_tx, file_rx) = queue::channel(4, Duration::from_millis(20), quit);

    let mut a = SubVector::new(1024);
    a.push(Key::new(5, 1), packed(b"AAAA"));
    a.push(Key::new(1, 1), packed(b"CC"));
    let mut b = SubVector::new(1024);
    b.push(Key::new(3, 2), packed(b"GG"));
    b.push(Key::new(1, 2), packed(b"TT"));

    sub_tx.push(a.into_sorted()).unwrap();
    sub_tx.push(b.into_sorted()).unwrap();
    sub_tx.seal();

    // batch target large enough that everything lands in one file
    let written = run_vector_merger(&sub_rx, file_tx, &ctx, usize::MAX, 4096).unwrap();
    assert_eq!(written, 4);

    let path = file_rx.pop().unwrap().unwrap();
    assert_eq!(
      read_all_keys(&path),
      vec![
        Key::new(1, 1),
        Key::new(1, 2),
        Key::new(3, 2),
        Key::new(5, 1),
      ]
    );
    assert!(file_rx.pop().unwrap().is_none());
  }

  #[test]
  fn small_batch_target_splits_output_files() {
    let root = tempfile::tempdir().unwrap();
    let ctx = RunContext::create(root.path()).unwrap();
    let quit = QuitFlag::new();

    let (sub_tx, sub_rx) = queue::channel(8, Duration::from_millis(20), quit.clone());
    let (file_tx, file_rx) = queue::channel(8, Duration::from_millis(20), quit);

    for spot in 1..=3i64 {
      let mut sub = SubVector::new(16);
      sub.push(Key::new(spot, 1), packed(b"ACGT"));
      sub_tx.push(sub.into_sorted()).unwrap();
    }
    sub_tx.seal();

    run_vector_merger(&sub_rx, file_tx, &ctx, 1, 4096).unwrap();

    let mut files = 0;
    while file_rx.pop().unwrap().is_some() {
      files += 1;
    }
    assert_eq!(files, 3);
  }
}
