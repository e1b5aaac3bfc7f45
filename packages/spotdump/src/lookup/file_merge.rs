use crate::codec::key::Key;
use crate::concurrent::queue::QueueReceiver;
use crate::context::RunContext;
use crate::error::{DumpError, IoContext, Result};
use crate::lookup::index::IndexWriter;
use crate::lookup::record;
use log::debug;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Background consumer of sorted temp files.
///
/// Collects the files emitted by the vector-merger, then k-way merges them
/// in rounds of at most `fan_in` inputs until a single sorted file remains.
/// The final round streams into the lookup path and emits an index
/// checkpoint every `index_stride` records.
pub fn run_file_merger(
  rx: &QueueReceiver<PathBuf>,
  ctx: &RunContext,
  fan_in: usize,
  index_stride: u64,
  buf_size: usize,
  lookup_path: &Path,
  index_path: &Path,
) -> Result<u64> {
  let fan_in = fan_in.max(2);
  let mut files: Vec<PathBuf> = Vec::new();
  while let Some(path) = rx.pop()? {
    files.push(path);
  }

  ctx.cleanup.register_file(lookup_path);
  ctx.cleanup.register_file(index_path);

  let mut round = 0u32;
  while files.len() > fan_in {
    let mut next_round: Vec<PathBuf> = Vec::new();
    for (group_idx, group) in files.chunks(fan_in).enumerate() {
      let out = ctx.temp_path(&format!("merge_{round}_{group_idx}.dat"));
      ctx.cleanup.register_file(&out);
      let merged = merge_files(group, &out, None, buf_size)?;
      debug!(
        "file-merger: round {round} group {group_idx}: {merged} records into '{}'",
        out.display()
      );
      for used in group {
        ctx.cleanup.delete_file(used);
      }
      next_round.push(out);
    }
    files = next_round;
    round += 1;
  }

  let mut index = IndexWriter::new(index_stride);
  let total = merge_files(&files, lookup_path, Some(&mut index), buf_size)?;
  for used in &files {
    ctx.cleanup.delete_file(used);
  }
  index.finish(index_path)?;
  debug!(
    "file-merger: {total} records in final lookup '{}'",
    lookup_path.display()
  );
  Ok(total)
}

struct FileCursor {
  reader: BufReader<File>,
  packed: Vec<u8>,
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
    // reversed for a min-heap; equal keys drain in source order
    (other.key, other.src).cmp(&(self.key, self.src))
  }
}

impl PartialOrd for HeadEntry {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// Merges `inputs` (each sorted by key) into `output`; `index` is fed with
/// every record's pre-write offset during the final round. An empty input
/// set yields an empty output file, so a lookup-free archive still gets a
/// well-formed (empty) lookup.
fn merge_files(
  inputs: &[PathBuf],
  output: &Path,
  mut index: Option<&mut IndexWriter>,
  buf_size: usize,
) -> Result<u64> {
  let out_file = File::create(output).op("creating merged lookup file")?;
  let mut writer = BufWriter::with_capacity(buf_size, out_file);

  let mut cursors = Vec::with_capacity(inputs.len());
  let mut heap = BinaryHeap::new();
  for (src, path) in inputs.iter().enumerate() {
    let file = File::open(path).op("opening sorted temp file")?;
    let mut cursor = FileCursor {
      reader: BufReader::with_capacity(buf_size, file),
      packed: Vec::new(),
    };
    if let Some(key) = record::read_record(&mut cursor.reader, &mut cursor.packed)? {
      heap.push(HeadEntry { key, src });
    }
    cursors.push(cursor);
  }

  let mut offset = 0u64;
  let mut written = 0u64;
  let mut last_key: Option<Key> = None;
  while let Some(HeadEntry { key, src }) = heap.pop() {
    if last_key == Some(key) {
      return Err(DumpError::DataInvalid(format!(
        "duplicate lookup key for spot {} read {}",
        key.spot_id(),
        key.read_id()
      )));
    }
    last_key = Some(key);

    if let Some(index) = index.as_deref_mut() {
      index.record(key, offset);
    }
    let cursor = &mut cursors[src];
    record::write_record(&mut writer, key, &cursor.packed)?;
    offset += record::disk_len(&cursor.packed);
    written += 1;

    if let Some(next_key) = record::read_record(&mut cursor.reader, &mut cursor.packed)? {
      heap.push(HeadEntry { key: next_key, src });
    }
  }

  writer.flush().op("flushing merged lookup file")?;
  Ok(written)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::concurrent::queue;
  use crate::concurrent::quit::QuitFlag;
  use crate::lookup::index::IndexReader;
  use pretty_assertions::assert_eq;
  use std::time::Duration;

  fn write_sorted_file(dir: &Path, name: &str, spots: &[i64]) -> PathBuf {
    let path = dir.join(name);
    let mut writer = BufWriter::new(File::create(&path).unwrap());
    let mut packed = Vec::new();
    for &spot in spots {
      crate::codec::pack::pack(b"ACGT", &mut packed).unwrap();
      record::write_record(&mut writer, Key::new(spot, 1), &packed).unwrap();
    }
    writer.flush().unwrap();
    path
  }

  fn read_all_keys(path: &Path) -> Vec<Key> {
    let mut reader = BufReader::new(File::open(path).unwrap());
    let mut keys = Vec::new();
    let mut buf = Vec::new();
    while let Some(key) = record::read_record(&mut reader, &mut buf).unwrap() {
      keys.push(key);
    }
    keys
  }

  fn run_merger_over(
    files: Vec<PathBuf>,
    fan_in: usize,
    stride: u64,
  ) -> (tempfile::TempDir, PathBuf, PathBuf, u64) {
    let root = tempfile::tempdir().unwrap();
    let ctx = RunContext::create(root.path()).unwrap();
    let quit = QuitFlag::new();
    let (tx, rx) = queue::channel(64, Duration::from_millis(20), quit);
    for file in files {
      tx.push(file).unwrap();
    }
    tx.seal();

    let lookup = ctx.temp_path("lookup");
    let index = ctx.temp_path("lookup.idx");
    let total = run_file_merger(&rx, &ctx, fan_in, stride, 4096, &lookup, &index).unwrap();
    (root, lookup, index, total)
  }

  #[test]
  fn multi_round_merge_restores_global_order() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
      write_sorted_file(dir.path(), "a.dat", &[1, 5, 9]),
      write_sorted_file(dir.path(), "b.dat", &[2, 6]),
      write_sorted_file(dir.path(), "c.dat", &[3, 7]),
      write_sorted_file(dir.path(), "d.dat", &[4, 8]),
    ];

    // fan-in 2 forces two rounds
    let (_root, lookup, index_path, total) = run_merger_over(files, 2, 2);
    assert_eq!(total, 9);
    let keys = read_all_keys(&lookup);
    let expected: Vec<Key> = (1..=9).map(|spot| Key::new(spot, 1)).collect();
    assert_eq!(keys, expected);

    let index = IndexReader::open(&index_path).unwrap();
    assert_eq!(index.max_key(), Key::new(9, 1));
  }

  #[test]
  fn duplicate_keys_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
      write_sorted_file(dir.path(), "a.dat", &[1, 2]),
      write_sorted_file(dir.path(), "b.dat", &[2, 3]),
    ];

    let root = tempfile::tempdir().unwrap();
    let ctx = RunContext::create(root.path()).unwrap();
    let quit = QuitFlag::new();
    let (tx, rx) = queue::channel(8, Duration::from_millis(20), quit);
    for file in files {
      tx.push(file).unwrap();
    }
    tx.seal();

    let lookup = ctx.temp_path("lookup");
    let index = ctx.temp_path("lookup.idx");
    let res = run_file_merger(&rx, &ctx, 16, 64, 4096, &lookup, &index);
    assert!(matches!(res, Err(DumpError::DataInvalid(_))));
  }

  #[test]
  fn no_input_files_yield_an_empty_lookup() {
    let (_root, lookup, index_path, total) = run_merger_over(Vec::new(), 16, 64);
    assert_eq!(total, 0);
    assert_eq!(read_all_keys(&lookup), Vec::<Key>::new());
    let index = IndexReader::open(&index_path).unwrap();
    assert_eq!(index.nearest_offset(Key::new(1, 1)), None);
  }
}
