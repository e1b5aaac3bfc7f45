use crate::archive::json::JsonArchive;
use crate::archive::{Archive, SequenceTable};
use crate::concurrent::{join_thread, note_err};
use crate::config::{CONSENSUS_TABLE, DFLT_SEQ_TABLE, JoinOptions, RunConfig};
use crate::context::RunContext;
use crate::error::{DumpError, Result};
use crate::format::defline::DeflineSet;
use crate::join::partition::partition_rows;
use crate::join::stats::JoinStats;
use crate::join::worker::{JoinParams, WorkerOutput, join_worker};
use crate::lookup::index::IndexReader;
use crate::lookup::produce::{LookupParams, produce_lookup};
use crate::lookup::reader::LookupReader;
use crate::output::registry::{TempRegistry, bucket_filename};
use crate::utils::fs::ensure_dir;
use log::info;
use std::path::{Path, PathBuf};
use std::thread;

/// What a completed run reports back.
#[derive(Debug, Default)]
pub struct RunSummary {
  pub stats: JoinStats,
  pub outputs: Vec<PathBuf>,
}

/// Opens the accession and drives the full pipeline over it.
pub fn run(cfg: &RunConfig) -> Result<RunSummary> {
  let cfg = cfg.clone().validated()?;
  let archive = JsonArchive::open(&cfg.accession_path, cfg.cur_cache)?;
  run_archive(&archive, &cfg)
}

/// The pipeline over an already-opened archive: lookup production (when the
/// archive has an alignment table), the sharded join, and the final
/// concatenation. All temp artifacts are swept on every exit path.
pub fn run_archive(archive: &dyn Archive, cfg: &RunConfig) -> Result<RunSummary> {
  if archive.platform().to_ascii_uppercase().contains("PACBIO") && cfg.format.needs_lookup() {
    return Err(DumpError::Unsupported(format!(
      "platform {} requires the unsorted FASTA mode",
      archive.platform()
    )));
  }

  let table = resolve_table(archive, cfg)?;
  let opts = cfg.join.clone().corrected(table.has_name_column());

  let output = if cfg.use_stdout {
    None
  } else {
    let path = cfg.output.clone().unwrap_or_else(|| {
      PathBuf::from(format!(
        "{}.{}",
        archive.accession(),
        cfg.format.default_extension()
      ))
    });
    ensure_dir(&path)?;
    check_output_absent(&path, cfg)?;
    Some(path)
  };

  let temp_root = cfg
    .temp_root
    .clone()
    .unwrap_or_else(std::env::temp_dir);
  let ctx = RunContext::create(&temp_root)?;

  // run the phases, then sweep temp artifacts no matter how they ended
  let result = run_phases(archive, table, cfg, &opts, output.as_deref(), &ctx);
  ctx.cleanup.delete_all();
  result
}

fn resolve_table<'a>(archive: &'a dyn Archive, cfg: &RunConfig) -> Result<&'a dyn SequenceTable> {
  // an explicit table name wins; the CONSENSUS probe runs only without one
  let name = match &cfg.table {
    Some(name) => name.clone(),
    None => {
      let names = archive.table_names();
      if names.iter().any(|name| name == CONSENSUS_TABLE) {
        CONSENSUS_TABLE.to_owned()
      } else {
        DFLT_SEQ_TABLE.to_owned()
      }
    }
  };
  archive.sequence_table(&name)
}

fn check_output_absent(output: &Path, cfg: &RunConfig) -> Result<()> {
  if cfg.force || cfg.append {
    return Ok(());
  }
  let buckets: &[u32] = if cfg.format.is_multi_bucket() {
    &[0, 1, 2]
  } else {
    &[0]
  };
  for &bucket in buckets {
    let candidate = bucket_filename(output, bucket);
    if candidate.exists() {
      return Err(DumpError::Usage(format!(
        "output file '{}' already exists; use force or append",
        candidate.display()
      )));
    }
  }
  Ok(())
}

fn run_phases(
  archive: &dyn Archive,
  table: &dyn SequenceTable,
  cfg: &RunConfig,
  opts: &JoinOptions,
  output: Option<&Path>,
  ctx: &RunContext,
) -> Result<RunSummary> {
  let needs_lookup = cfg.format.needs_lookup() && archive.alignment_table().is_some();
  let lookup_path = ctx.temp_path("lookup");
  let index_path = ctx.temp_path("lookup.idx");

  if needs_lookup {
    let alignments = archive
      .alignment_table()
      .ok_or_else(|| DumpError::DataInvalid("alignment table vanished".into()))?;
    let params = LookupParams::new(cfg.mem_limit, cfg.buf_size);
    let records =
      produce_lookup(alignments, ctx, &params, cfg.num_threads, &lookup_path, &index_path)?;
    info!("lookup phase done: {records} records");
  }

  let deflines = DeflineSet::resolve(
    cfg.format,
    opts.print_read_nr,
    cfg.seq_defline.as_deref(),
    cfg.qual_defline.as_deref(),
  )?;
  let params = JoinParams {
    accession: archive.accession(),
    fmt: cfg.format,
    opts,
    deflines: &deflines,
    buf_size: cfg.buf_size,
  };

  let shards = partition_rows(table.row_range(), cfg.num_threads);
  info!(
    "join phase: {} spots over {} worker(s)",
    table.row_range().count,
    shards.len()
  );

  let results: Vec<Result<WorkerOutput>> = thread::scope(|scope| {
    let handles: Vec<_> = shards
      .iter()
      .enumerate()
      .map(|(worker_idx, shard)| {
        let lookup_path = &lookup_path;
        let index_path = &index_path;
        scope.spawn(move || {
          // each worker opens its own handles on the lookup
          let lookup = if needs_lookup {
            let index = IndexReader::open(index_path)?;
            Some(LookupReader::open(lookup_path, Some(index), cfg.buf_size)?)
          } else {
            None
          };
          join_worker(worker_idx, table, *shard, lookup, &params, ctx)
        })
      })
      .collect();
    handles.into_iter().map(join_thread).collect()
  });

  let mut stats = JoinStats::default();
  let mut registry = TempRegistry::new();
  let mut first_err = None;
  for result in results {
    match result {
      Ok(out) => {
        stats += out.stats;
        for (bucket, path) in out.parts {
          registry.register(bucket, path);
        }
      }
      Err(err) => note_err(&mut first_err, err, &ctx.quit),
    }
  }
  if let Some(err) = first_err {
    return Err(err);
  }

  // the lookup and its index are dead weight from here on
  if needs_lookup {
    ctx.cleanup.delete_file(&lookup_path);
    ctx.cleanup.delete_file(&index_path);
  }

  let outputs = match output {
    None => {
      registry.concat_to_stdout(cfg.buf_size, &ctx.cleanup)?;
      Vec::new()
    }
    Some(output) => {
      registry.concat_to_files(output, cfg.buf_size, cfg.force, cfg.append, &ctx.cleanup)?
    }
  };

  info!(
    "done: {} spots read, {} reads written",
    stats.spots_read, stats.reads_written
  );
  Ok(RunSummary { stats, outputs })
}
