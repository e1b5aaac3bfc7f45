use clap::{Parser, ValueHint};
use spotdump::config::{
  DFLT_BUF_SIZE, DFLT_CUR_CACHE, DFLT_MEM_LIMIT, DFLT_NUM_THREADS, JoinOptions, RunConfig,
  resolve_format, resolve_skip_tech,
};
use spotdump::error::Result;
use spotdump::join::filter::BaseFilter;
use std::path::PathBuf;

/// Converts a sequence-read archive with aligned and unaligned reads into
/// FASTA or FASTQ.
///
/// For aligned spots the read bases live on the alignment table; the tool
/// builds a disk-backed sorted lookup over them and joins it back against
/// the sequence table in parallel shards.
#[derive(Parser, Debug)]
#[command(name = "spotdump", author, version, verbatim_doc_comment)]
pub struct SpotdumpArgs {
  /// Path of the archive to convert
  #[arg(value_hint = ValueHint::FilePath)]
  pub accession: PathBuf,

  /// Output format.
  ///
  /// One of: fastq, fastq-whole-spot, fastq-split-spot, fastq-split-files,
  /// fastq-split-3, fasta, fasta-whole-spot, fasta-split-spot,
  /// fasta-split-files, fasta-split-3, fasta-unsorted.
  #[arg(long, short = 'F')]
  pub format: Option<String>,

  /// Write output to this file (default: <accession>.fastq / .fasta)
  #[arg(long, short = 'o', value_hint = ValueHint::AnyPath)]
  pub outfile: Option<PathBuf>,

  /// Split spots into reads
  #[arg(long, short = 's')]
  pub split_spot: bool,

  /// Write reads into different files
  #[arg(long, short = 'S')]
  pub split_files: bool,

  /// Write paired reads into different files, single reads into a third one
  #[arg(long, short = '3')]
  pub split_3: bool,

  /// Write whole spots into one file
  #[arg(long = "concatenate-reads")]
  pub whole_spot: bool,

  /// Produce FASTA output instead of FASTQ
  #[arg(long)]
  pub fasta: bool,

  /// Produce FASTA output without the spot-sorting lookup (inline bases only)
  #[arg(long)]
  pub fasta_unsorted: bool,

  /// How many worker threads to use (minimum 2)
  #[arg(long, short = 'e', default_value_t = DFLT_NUM_THREADS)]
  pub threads: u32,

  /// Memory budget per sort batch, in bytes
  #[arg(long, short = 'm', default_value_t = DFLT_MEM_LIMIT)]
  pub mem: usize,

  /// Size of file I/O buffers, in bytes (clamped to 1 GiB)
  #[arg(long, short = 'b', default_value_t = DFLT_BUF_SIZE)]
  pub bufsize: usize,

  /// Size of the cursor cache, in bytes
  #[arg(long, short = 'c', default_value_t = DFLT_CUR_CACHE)]
  pub curcache: usize,

  /// Directory for temporary files (default: the OS temp dir)
  #[arg(long, short = 't', value_hint = ValueHint::DirPath)]
  pub temp: Option<PathBuf>,

  /// Custom defline for sequence lines.
  ///
  /// Variables: $ac accession, $sn spot name, $sg spot group, $si spot id,
  /// $ri read id, $rl read length. Example: '@$ac.$si/$ri $sn length=$rl'
  #[arg(long)]
  pub seq_defline: Option<String>,

  /// Custom defline for quality lines (same variables as --seq-defline)
  #[arg(long)]
  pub qual_defline: Option<String>,

  /// Drop technical reads (default in split modes)
  #[arg(long, conflicts_with = "include_technical")]
  pub skip_technical: bool,

  /// Keep technical reads (default in whole-spot mode)
  #[arg(long)]
  pub include_technical: bool,

  /// Drop reads shorter than this many bases
  #[arg(long, short = 'M', default_value_t = 0)]
  pub min_read_len: u32,

  /// Only output spots containing this nucleotide sequence
  #[arg(long, short = 'B')]
  pub bases: Option<String>,

  /// Use the row id as the spot name
  #[arg(long, short = 'N')]
  pub rowid_as_name: bool,

  /// Carry the read number in deflines even for whole-spot output
  #[arg(long, short = 'P')]
  pub print_read_nr: bool,

  /// Dump only spots with aligned reads
  #[arg(long, short = 'a')]
  pub only_aligned: bool,

  /// Dump only spots without aligned reads
  #[arg(long, short = 'U')]
  pub only_unaligned: bool,

  /// Overwrite existing output files
  #[arg(long, short = 'f')]
  pub force: bool,

  /// Append to existing output files
  #[arg(long, short = 'A')]
  pub append: bool,

  /// Stream output to stdout instead of files
  #[arg(long, short = 'Z')]
  pub stdout: bool,

  /// Use this table instead of SEQUENCE (CONSENSUS is probed automatically)
  #[arg(long)]
  pub table: Option<String>,

  /// Terminate the whole run on the first invalid row
  #[arg(long)]
  pub strict: bool,

  /// Make output more verbose (-v info, -vv debug, -vvv trace)
  #[arg(long, short = 'v', action = clap::ArgAction::Count)]
  pub verbose: u8,
}

/// Folds the raw arguments into the pipeline's run configuration.
pub fn build_config(args: &SpotdumpArgs) -> Result<RunConfig> {
  let format = resolve_format(
    args.format.as_deref(),
    args.split_spot,
    args.split_files,
    args.split_3,
    args.whole_spot,
    args.fasta,
    args.fasta_unsorted,
  )?;

  let mut cfg = RunConfig::new(&args.accession, format);
  cfg.output = args.outfile.clone();
  cfg.num_threads = args.threads;
  cfg.mem_limit = args.mem;
  cfg.buf_size = args.bufsize;
  cfg.cur_cache = args.curcache;
  cfg.temp_root = args.temp.clone();
  cfg.seq_defline = args.seq_defline.clone();
  cfg.qual_defline = args.qual_defline.clone();
  cfg.table = args.table.clone();
  cfg.force = args.force;
  cfg.append = args.append;
  cfg.use_stdout = args.stdout;
  cfg.join = JoinOptions {
    rowid_as_name: args.rowid_as_name,
    skip_tech: resolve_skip_tech(args.skip_technical, args.include_technical, format),
    print_read_nr: args.print_read_nr,
    min_read_len: args.min_read_len,
    filter_bases: args
      .bases
      .as_deref()
      .map(BaseFilter::new)
      .transpose()?,
    terminate_on_invalid: args.strict,
    only_aligned: args.only_aligned,
    only_unaligned: args.only_unaligned,
  };
  Ok(cfg)
}
