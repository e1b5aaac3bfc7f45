use crate::archive::{AlignmentTable, RowRange};
use crate::codec::key::Key;
use crate::codec::pack;
use crate::concurrent::locked::LockedValue;
use crate::concurrent::queue::{self, QUEUE_TIMEOUT, QueueSender};
use crate::concurrent::quit::QuitFlag;
use crate::concurrent::{join_thread, note_err};
use crate::context::RunContext;
use crate::error::{DumpError, Result};
use crate::join::partition::partition_rows;
use crate::lookup::file_merge::run_file_merger;
use crate::lookup::index::DFLT_INDEX_STRIDE;
use crate::lookup::subvec::{SortedSubVector, SubVector};
use crate::lookup::vector_merge::run_vector_merger;
use log::{debug, info};
use std::mem;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Sub-vectors are heavy (up to mem_limit bytes each); a short queue is
/// enough to keep the merger busy.
const SUBVEC_QUEUE_CAP: usize = 4;
const FILE_QUEUE_CAP: usize = 64;

/// Knobs of the lookup-production phase.
#[derive(Debug, Clone)]
pub struct LookupParams {
  pub mem_limit: usize,
  /// Merge-batch target of the vector-merger; 4 × mem_limit by default.
  pub batch_bytes: usize,
  pub buf_size: usize,
  pub fan_in: usize,
  pub index_stride: u64,
  pub queue_timeout: Duration,
}

impl LookupParams {
  pub fn new(mem_limit: usize, buf_size: usize) -> Self {
    Self {
      mem_limit,
      batch_bytes: mem_limit.saturating_mul(4),
      buf_size,
      fan_in: 16,
      index_stride: DFLT_INDEX_STRIDE,
      queue_timeout: QUEUE_TIMEOUT,
    }
  }
}

/// Builds the sorted lookup file and its sparse index from the alignment
/// table.
///
/// Fans the alignment scan out over shard producers, each accumulating
/// (key, packed bases) pairs up to the memory budget; sorted sub-vectors are
/// handed to the background vector-merger, whose sorted temp files the
/// background file-merger folds into the single final file. Returns the
/// record count.
pub fn produce_lookup(
  alignments: &dyn AlignmentTable,
  ctx: &RunContext,
  params: &LookupParams,
  num_threads: u32,
  lookup_path: &Path,
  index_path: &Path,
) -> Result<u64> {
  let range = alignments.row_range();
  let shards = partition_rows(range, num_threads);
  info!(
    "lookup: scanning {} alignment rows over {} producer(s)",
    range.count,
    shards.len()
  );

  let (sub_tx, sub_rx) = queue::channel::<SortedSubVector>(
    SUBVEC_QUEUE_CAP,
    params.queue_timeout,
    ctx.quit.clone(),
  );
  let (file_tx, file_rx) =
    queue::channel::<PathBuf>(FILE_QUEUE_CAP, params.queue_timeout, ctx.quit.clone());

  let produced = LockedValue::new(0);
  let merged = thread::scope(|scope| -> Result<u64> {
    let vector_merger = scope
      .spawn(|| run_vector_merger(&sub_rx, file_tx, ctx, params.batch_bytes, params.buf_size));
    let file_merger = scope.spawn(|| {
      run_file_merger(
        &file_rx,
        ctx,
        params.fan_in,
        params.index_stride,
        params.buf_size,
        lookup_path,
        index_path,
      )
    });

    let mut producers = Vec::with_capacity(shards.len());
    for shard in &shards {
      let tx = sub_tx.clone();
      let produced = &produced;
      producers.push(scope.spawn(move || {
        scan_shard(alignments, *shard, tx, params.mem_limit, produced, &ctx.quit)
      }));
    }
    // producers hold the only remaining senders; the stream seals when the
    // last one finishes
    drop(sub_tx);

    let mut first_err = None;
    for producer in producers {
      if let Err(err) = join_thread(producer) {
        note_err(&mut first_err, err, &ctx.quit);
      }
    }
    let mut merged = 0u64;
    match join_thread(vector_merger) {
      Ok(_) => {}
      Err(err) => note_err(&mut first_err, err, &ctx.quit),
    }
    match join_thread(file_merger) {
      Ok(count) => merged = count,
      Err(err) => note_err(&mut first_err, err, &ctx.quit),
    }

    match first_err {
      Some(err) => Err(err),
      None => Ok(merged),
    }
  })?;

  let produced = produced.get();

  if produced != merged {
    return Err(DumpError::DataInvalid(format!(
      "lookup lost records: {produced} produced, {merged} merged"
    )));
  }
  debug!("lookup: {merged} records in '{}'", lookup_path.display());
  Ok(merged)
}

/// One producer: scans its alignment shard in row order, packs each
/// RAW_READ, and ships memory-budget-sized sorted sub-vectors downstream.
fn scan_shard(
  alignments: &dyn AlignmentTable,
  shard: RowRange,
  tx: QueueSender<SortedSubVector>,
  mem_limit: usize,
  produced: &LockedValue,
  quit: &QuitFlag,
) -> Result<()> {
  let mut sub = SubVector::new(mem_limit);
  let mut count = 0u64;

  for record in alignments.scan(shard)? {
    if quit.is_set() {
      return Err(DumpError::Cancelled);
    }
    let record = record?;
    if record.read_id != 1 && record.read_id != 2 {
      return Err(DumpError::DataInvalid(format!(
        "alignment row {}: SEQ_READ_ID {} is outside {{1, 2}}",
        record.row_id, record.read_id
      )));
    }
    let key = Key::new(record.spot_id, record.read_id);
    let mut packed = Vec::new();
    pack::pack(&record.bases, &mut packed)?;
    sub.push(key, packed);
    count += 1;

    if sub.is_full() {
      let full = mem::replace(&mut sub, SubVector::new(mem_limit));
      tx.push(full.into_sorted())?;
    }
  }

  if !sub.is_empty() {
    tx.push(sub.into_sorted())?;
  }
  tx.seal();
  produced.add(count);
  Ok(())
}
