use crate::archive::{READ_TYPE_BIOLOGICAL, READ_TYPE_REVERSE, RowRange, SequenceTable, SpotRecord};
use crate::archive::seq_iter::SpotIterator;
use crate::codec::key::Key;
use crate::config::{JoinOptions, OutputFormat};
use crate::context::RunContext;
use crate::error::{DumpError, IoContext, Result};
use crate::format::defline::{DeflineContext, DeflineSet};
use crate::format::writer::{quality_to_ascii, write_fasta, write_fastq};
use crate::join::stats::JoinStats;
use crate::lookup::reader::LookupReader;
use log::debug;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Immutable per-run parameters shared by every join worker.
#[derive(Debug, Clone, Copy)]
pub struct JoinParams<'a> {
  pub accession: &'a str,
  pub fmt: OutputFormat,
  pub opts: &'a JoinOptions,
  pub deflines: &'a DeflineSet,
  pub buf_size: usize,
}

/// What one worker hands back to the coordinator.
#[derive(Debug)]
pub struct WorkerOutput {
  pub stats: JoinStats,
  /// (bucket, part path), to be registered in shard order.
  pub parts: Vec<(u32, PathBuf)>,
}

/// One read of a spot after assembly.
#[derive(Debug, Clone, Copy)]
struct ReadSeg {
  read_id: u32,
  len: usize,
  /// Start of this read's bases in the assembled buffer; `None` when the
  /// read was not materialized (aligned read in unsorted-FASTA mode).
  start: Option<usize>,
  /// Start of this read's quality window in the full spot.
  qual_start: usize,
  technical: bool,
}

/// Reconstructs and formats every spot of one shard.
///
/// Reads with a zero `primary_alignment_id` take their bases from the
/// inline CMP_READ window; aligned reads are fetched from the lookup by
/// `(spot_id, read_id)`, reverse-complemented when READ_TYPE has the
/// reverse bit. Output goes to per-bucket temp files owned exclusively by
/// this worker.
pub fn join_worker(
  worker_idx: usize,
  table: &dyn SequenceTable,
  range: RowRange,
  mut lookup: Option<LookupReader>,
  params: &JoinParams<'_>,
  ctx: &RunContext,
) -> Result<WorkerOutput> {
  debug!(
    "join worker {worker_idx}: rows {}..{}",
    range.first,
    range.end()
  );
  let opts = params.opts;
  let strict = opts.terminate_on_invalid;

  // position the reader near the shard's first key so the fast path in
  // lookup_bases applies from the first aligned spot on
  if let Some(lookup) = lookup.as_mut() {
    let _ = lookup.seek(Key::new(range.first, 1), false);
  }

  let mut writers = BucketWriters::new(worker_idx, params.buf_size, ctx);
  let mut stats = JoinStats::default();

  let mut assembled: Vec<u8> = Vec::new();
  let mut reads: Vec<ReadSeg> = Vec::new();
  let mut fetched: Vec<u8> = Vec::new();
  let mut spot_bases: Vec<u8> = Vec::new();
  let mut spot_qual: Vec<u8> = Vec::new();
  let mut qual_ascii: Vec<u8> = Vec::new();
  let mut line = String::new();

  for record in SpotIterator::open(table, range)? {
    if ctx.quit.is_set() {
      return Err(DumpError::Cancelled);
    }

    let record = match record {
      Ok(record) => record,
      Err(err @ DumpError::DataInvalid(_)) => {
        if strict {
          ctx.quit.set();
          return Err(err);
        }
        stats.reads_invalid += 1;
        continue;
      }
      Err(err) => {
        ctx.quit.set();
        return Err(err);
      }
    };
    stats.spots_read += 1;

    if opts.only_aligned && !record.is_aligned() {
      continue;
    }
    if opts.only_unaligned && record.is_aligned() {
      continue;
    }

    match assemble_spot(&record, lookup.as_mut(), params.fmt, &mut assembled, &mut reads, &mut fetched) {
      Ok(()) => {}
      Err(err @ (DumpError::DataInvalid(_) | DumpError::NotFound { .. })) => {
        if strict {
          ctx.quit.set();
          return Err(err);
        }
        stats.reads_invalid += 1;
        continue;
      }
      Err(err) => {
        ctx.quit.set();
        return Err(err);
      }
    }

    stats.reads_read += reads.len() as u64;

    if let Some(filter) = &opts.filter_bases {
      if !filter.matches(&assembled) {
        continue;
      }
    }

    let name = if opts.rowid_as_name {
      None
    } else {
      record.name.as_deref()
    };
    let defline_ctx = DeflineContext {
      accession: params.accession,
      spot_name: name,
      spot_group: record.spot_group.as_deref(),
      spot_id: record.row_id,
      read_id: 1,
      read_len: 0,
    };

    // reads surviving the per-read filters, in read order
    let selected = select_reads(&reads, opts, params.fmt, &mut stats);

    if params.fmt.is_split() {
      emit_split(
        &record,
        &assembled,
        &selected,
        params,
        defline_ctx,
        &mut writers,
        &mut stats,
        (&mut qual_ascii, &mut line),
      )?;
    } else {
      emit_whole(
        &record,
        &assembled,
        &selected,
        params,
        defline_ctx,
        &mut writers,
        &mut stats,
        (&mut spot_bases, &mut spot_qual, &mut qual_ascii, &mut line),
      )?;
    }
  }

  let parts = writers.finish()?;
  debug!(
    "join worker {worker_idx}: {} spots, {} reads written",
    stats.spots_read, stats.reads_written
  );
  Ok(WorkerOutput { stats, parts })
}

/// Walks the spot's reads in order, pulling inline bases out of CMP_READ and
/// aligned bases out of the lookup.
fn assemble_spot(
  record: &SpotRecord,
  mut lookup: Option<&mut LookupReader>,
  fmt: OutputFormat,
  assembled: &mut Vec<u8>,
  reads: &mut Vec<ReadSeg>,
  fetched: &mut Vec<u8>,
) -> Result<()> {
  assembled.clear();
  reads.clear();

  let mut cmp_offset = 0usize;
  let mut qual_start = 0usize;

  for (idx, &len) in record.read_len.iter().enumerate() {
    let len = len as usize;
    let read_id = (idx + 1) as u32;
    let technical = record
      .read_type
      .get(idx)
      .is_some_and(|&flags| flags & READ_TYPE_BIOLOGICAL == 0);
    let alig_id = record.prim_alig_ids.get(idx).copied().unwrap_or(0);

    let start = if alig_id == 0 {
      let end = cmp_offset + len;
      if end > record.bases.len() {
        return Err(DumpError::DataInvalid(format!(
          "spot {}: READ_LEN asks for {} inline bases but only {} are stored",
          record.row_id,
          end,
          record.bases.len()
        )));
      }
      let start = assembled.len();
      assembled.extend_from_slice(&record.bases[cmp_offset..end]);
      cmp_offset = end;
      Some(start)
    } else if !fmt.needs_lookup() {
      // unsorted FASTA never touches the lookup; aligned reads are dropped
      None
    } else {
      let lookup = lookup.as_deref_mut().ok_or_else(|| {
        DumpError::DataInvalid(format!(
          "spot {}: aligned read {} but no lookup is available",
          record.row_id, read_id
        ))
      })?;
      let reverse = record
        .read_type
        .get(idx)
        .is_some_and(|&flags| flags & READ_TYPE_REVERSE != 0);
      lookup.lookup_bases(record.row_id, read_id, reverse, fetched)?;
      if fetched.len() != len {
        return Err(DumpError::DataInvalid(format!(
          "spot {}: lookup returned {} bases for read {read_id} but READ_LEN says {len}",
          record.row_id,
          fetched.len()
        )));
      }
      let start = assembled.len();
      assembled.extend_from_slice(fetched);
      Some(start)
    };

    reads.push(ReadSeg {
      read_id,
      len,
      start,
      qual_start,
      technical,
    });
    qual_start += len;
  }

  if cmp_offset != record.bases.len() {
    return Err(DumpError::DataInvalid(format!(
      "spot {}: sum(READ_LEN) covers {} inline bases but {} are stored",
      record.row_id,
      cmp_offset,
      record.bases.len()
    )));
  }
  Ok(())
}

/// Applies the per-read filters, counting what gets dropped. Whole-spot
/// modes apply the length threshold to the concatenated spot instead.
fn select_reads(
  reads: &[ReadSeg],
  opts: &JoinOptions,
  fmt: OutputFormat,
  stats: &mut JoinStats,
) -> Vec<ReadSeg> {
  let mut selected = Vec::with_capacity(reads.len());
  for seg in reads {
    if seg.start.is_none() {
      // not materialized (unsorted FASTA): drop silently
      continue;
    }
    if seg.len == 0 {
      stats.reads_zero_length += 1;
      continue;
    }
    if opts.skip_tech && seg.technical {
      stats.reads_technical += 1;
      continue;
    }
    if fmt.is_split() && seg.len < opts.min_read_len as usize {
      stats.reads_too_short += 1;
      continue;
    }
    selected.push(*seg);
  }
  selected
}

#[allow(clippy::too_many_arguments)]
fn emit_split(
  record: &SpotRecord,
  assembled: &[u8],
  selected: &[ReadSeg],
  params: &JoinParams<'_>,
  defline_ctx: DeflineContext<'_>,
  writers: &mut BucketWriters<'_>,
  stats: &mut JoinStats,
  (qual_ascii, line): (&mut Vec<u8>, &mut String),
) -> Result<()> {
  let split_3 = matches!(
    params.fmt,
    OutputFormat::FastqSplit3 | OutputFormat::FastaSplit3
  );
  let split_files = matches!(
    params.fmt,
    OutputFormat::FastqSplitFile | OutputFormat::FastaSplitFile
  );

  for (pos, seg) in selected.iter().enumerate() {
    let bucket = if split_files {
      seg.read_id
    } else if split_3 {
      if selected.len() >= 2 { (pos + 1) as u32 } else { 0 }
    } else {
      0
    };

    let Some(start) = seg.start else { continue };
    let bases = &assembled[start..start + seg.len];
    let ctx = DeflineContext {
      read_id: seg.read_id,
      read_len: seg.len as u64,
      ..defline_ctx
    };

    let out = writers.get(bucket)?;
    if params.fmt.is_fasta() {
      line.clear();
      params.deflines.seq.render(&ctx, line);
      write_fasta(out, line, bases)?;
    } else {
      read_quality(record, seg.qual_start, seg.len, qual_ascii);
      line.clear();
      params.deflines.seq.render(&ctx, line);
      let split_at = line.len();
      params.deflines.qual.render(&ctx, line);
      let (seq_line, qual_line) = line.split_at(split_at);
      write_fastq(out, seq_line, bases, qual_line, qual_ascii)?;
    }
    stats.reads_written += 1;
  }
  Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_whole(
  record: &SpotRecord,
  assembled: &[u8],
  selected: &[ReadSeg],
  params: &JoinParams<'_>,
  defline_ctx: DeflineContext<'_>,
  writers: &mut BucketWriters<'_>,
  stats: &mut JoinStats,
  (spot_bases, spot_qual, qual_ascii, line): (
    &mut Vec<u8>,
    &mut Vec<u8>,
    &mut Vec<u8>,
    &mut String,
  ),
) -> Result<()> {
  spot_bases.clear();
  spot_qual.clear();
  for seg in selected {
    let Some(start) = seg.start else { continue };
    spot_bases.extend_from_slice(&assembled[start..start + seg.len]);
    read_quality(record, seg.qual_start, seg.len, qual_ascii);
    spot_qual.extend_from_slice(qual_ascii);
  }

  if spot_bases.is_empty() {
    return Ok(());
  }
  if spot_bases.len() < params.opts.min_read_len as usize {
    stats.reads_too_short += 1;
    return Ok(());
  }

  let ctx = DeflineContext {
    read_id: 1,
    read_len: spot_bases.len() as u64,
    ..defline_ctx
  };
  let out = writers.get(0)?;
  if params.fmt.is_fasta() {
    line.clear();
    params.deflines.seq.render(&ctx, line);
    write_fasta(out, line, spot_bases)?;
  } else {
    line.clear();
    params.deflines.seq.render(&ctx, line);
    let split_at = line.len();
    params.deflines.qual.render(&ctx, line);
    let (seq_line, qual_line) = line.split_at(split_at);
    write_fastq(out, seq_line, spot_bases, qual_line, spot_qual)?;
  }
  stats.reads_written += 1;
  Ok(())
}

/// ASCII quality for one read window; an absent QUALITY column reads as
/// all-zero phred values.
fn read_quality(record: &SpotRecord, start: usize, len: usize, out: &mut Vec<u8>) {
  if record.quality.is_empty() {
    out.clear();
    out.resize(len, b'!');
  } else {
    let end = (start + len).min(record.quality.len());
    quality_to_ascii(&record.quality[start.min(end)..end], out);
    out.resize(len, b'!');
  }
}

/// Lazily created per-(worker, bucket) temp files; every path is registered
/// with the cleanup registry before the file is created.
struct BucketWriters<'a> {
  worker_idx: usize,
  buf_size: usize,
  ctx: &'a RunContext,
  writers: BTreeMap<u32, BufWriter<File>>,
  parts: Vec<(u32, PathBuf)>,
}

impl<'a> BucketWriters<'a> {
  fn new(worker_idx: usize, buf_size: usize, ctx: &'a RunContext) -> Self {
    Self {
      worker_idx,
      buf_size,
      ctx,
      writers: BTreeMap::new(),
      parts: Vec::new(),
    }
  }

  fn get(&mut self, bucket: u32) -> Result<&mut BufWriter<File>> {
    use std::collections::btree_map::Entry;
    match self.writers.entry(bucket) {
      Entry::Occupied(entry) => Ok(entry.into_mut()),
      Entry::Vacant(entry) => {
        let path = self
          .ctx
          .temp_path(&format!("part_{}_{}", self.worker_idx, bucket));
        self.ctx.cleanup.register_file(&path);
        let file = File::create(&path).op("creating output part")?;
        self.parts.push((bucket, path));
        Ok(entry.insert(BufWriter::with_capacity(self.buf_size, file)))
      }
    }
  }

  fn finish(mut self) -> Result<Vec<(u32, PathBuf)>> {
    for writer in self.writers.values_mut() {
      writer.flush().op("flushing output part")?;
    }
    Ok(self.parts)
  }
}
