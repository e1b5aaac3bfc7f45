use crate::error::{DumpError, Result};
use crate::join::filter::BaseFilter;
use std::path::PathBuf;

pub const DFLT_CUR_CACHE: usize = 5 * 1024 * 1024;
pub const DFLT_BUF_SIZE: usize = 1024 * 1024;
pub const DFLT_MEM_LIMIT: usize = 50 * 1024 * 1024;
pub const DFLT_NUM_THREADS: u32 = 6;
pub const MIN_NUM_THREADS: u32 = 2;
pub const MAX_BUF_SIZE: usize = 1024 * 1024 * 1024;

pub const DFLT_SEQ_TABLE: &str = "SEQUENCE";
pub const CONSENSUS_TABLE: &str = "CONSENSUS";

/// The nine supported output shapes: fastq/fasta crossed with the spot-split
/// policies, plus the lookup-free unsorted FASTA mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
  FastqWholeSpot,
  FastqSplitSpot,
  FastqSplitFile,
  FastqSplit3,
  FastaWholeSpot,
  FastaSplitSpot,
  FastaSplitFile,
  FastaSplit3,
  FastaUnsorted,
}

impl OutputFormat {
  pub fn is_fasta(self) -> bool {
    matches!(
      self,
      Self::FastaWholeSpot
        | Self::FastaSplitSpot
        | Self::FastaSplitFile
        | Self::FastaSplit3
        | Self::FastaUnsorted
    )
  }

  pub fn is_split(self) -> bool {
    !matches!(self, Self::FastqWholeSpot | Self::FastaWholeSpot)
  }

  /// Split-files and split-3 route reads into more than one output bucket.
  pub fn is_multi_bucket(self) -> bool {
    matches!(
      self,
      Self::FastqSplitFile | Self::FastqSplit3 | Self::FastaSplitFile | Self::FastaSplit3
    )
  }

  /// Whether deflines carry the read number by default.
  pub fn prints_read_number(self) -> bool {
    self.is_split()
  }

  /// The unsorted FASTA mode bypasses the lookup pipeline entirely.
  pub fn needs_lookup(self) -> bool {
    !matches!(self, Self::FastaUnsorted)
  }

  pub fn default_extension(self) -> &'static str {
    if self.is_fasta() { "fasta" } else { "fastq" }
  }
}

/// Resolves `--format` plus the legacy selector flags into one format value.
///
/// The tool's default is FASTQ split-3. Legacy selectors pick the split
/// policy; `--fasta` / `--fasta-unsorted` switch the base-output mode.
pub fn resolve_format(
  format: Option<&str>,
  split_spot: bool,
  split_files: bool,
  split_3: bool,
  whole_spot: bool,
  fasta: bool,
  fasta_unsorted: bool,
) -> Result<OutputFormat> {
  let selectors = [split_spot, split_files, split_3, whole_spot];
  if selectors.iter().filter(|&&flag| flag).count() > 1 {
    return Err(DumpError::Usage(
      "split-spot, split-files, split-3 and concatenate-reads are mutually exclusive".into(),
    ));
  }

  if let Some(name) = format {
    return parse_format_name(name);
  }

  if fasta_unsorted {
    return Ok(OutputFormat::FastaUnsorted);
  }

  let fmt = match (split_spot, split_files, whole_spot, fasta) {
    (true, _, _, false) => OutputFormat::FastqSplitSpot,
    (true, _, _, true) => OutputFormat::FastaSplitSpot,
    (_, true, _, false) => OutputFormat::FastqSplitFile,
    (_, true, _, true) => OutputFormat::FastaSplitFile,
    (_, _, true, false) => OutputFormat::FastqWholeSpot,
    (_, _, true, true) => OutputFormat::FastaWholeSpot,
    (false, false, false, false) => OutputFormat::FastqSplit3,
    (false, false, false, true) => OutputFormat::FastaSplit3,
  };
  Ok(fmt)
}

fn parse_format_name(name: &str) -> Result<OutputFormat> {
  let fmt = match name.to_ascii_lowercase().as_str() {
    "fastq" | "fastq-split-3" => OutputFormat::FastqSplit3,
    "fastq-whole-spot" => OutputFormat::FastqWholeSpot,
    "fastq-split-spot" => OutputFormat::FastqSplitSpot,
    "fastq-split-files" => OutputFormat::FastqSplitFile,
    "fasta" | "fasta-split-3" => OutputFormat::FastaSplit3,
    "fasta-whole-spot" => OutputFormat::FastaWholeSpot,
    "fasta-split-spot" => OutputFormat::FastaSplitSpot,
    "fasta-split-files" => OutputFormat::FastaSplitFile,
    "fasta-unsorted" => OutputFormat::FastaUnsorted,
    other => {
      return Err(DumpError::Usage(format!("unknown format '{other}'")));
    }
  };
  Ok(fmt)
}

/// Per-read and per-spot join policies, assembled by the CLI and corrected
/// against the archive before workers start.
#[derive(Debug, Default, Clone)]
pub struct JoinOptions {
  pub rowid_as_name: bool,
  pub skip_tech: bool,
  pub print_read_nr: bool,
  pub min_read_len: u32,
  pub filter_bases: Option<BaseFilter>,
  pub terminate_on_invalid: bool,
  pub only_aligned: bool,
  pub only_unaligned: bool,
}

impl JoinOptions {
  /// Reconciles user flags with the archive and the chosen format:
  /// row ids stand in for names when the table has no NAME column, and
  /// requesting both alignment-side filters clears both.
  pub fn corrected(mut self, name_column_present: bool) -> Self {
    if !name_column_present {
      self.rowid_as_name = true;
    }
    if self.only_aligned && self.only_unaligned {
      self.only_aligned = false;
      self.only_unaligned = false;
    }
    self
  }
}

/// Technical reads are dropped by default in split modes; whole-spot output
/// keeps them. `--include-technical` / `--skip-technical` override.
pub fn resolve_skip_tech(skip_flag: bool, include_flag: bool, fmt: OutputFormat) -> bool {
  if include_flag {
    false
  } else if skip_flag {
    true
  } else {
    fmt.is_split()
  }
}

/// Everything the pipeline needs for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
  pub accession_path: PathBuf,
  pub output: Option<PathBuf>,
  pub format: OutputFormat,
  pub num_threads: u32,
  pub mem_limit: usize,
  pub buf_size: usize,
  pub cur_cache: usize,
  pub temp_root: Option<PathBuf>,
  pub seq_defline: Option<String>,
  pub qual_defline: Option<String>,
  pub table: Option<String>,
  pub join: JoinOptions,
  pub force: bool,
  pub append: bool,
  pub use_stdout: bool,
}

impl RunConfig {
  pub fn new(accession_path: impl Into<PathBuf>, format: OutputFormat) -> Self {
    Self {
      accession_path: accession_path.into(),
      output: None,
      format,
      num_threads: DFLT_NUM_THREADS,
      mem_limit: DFLT_MEM_LIMIT,
      buf_size: DFLT_BUF_SIZE,
      cur_cache: DFLT_CUR_CACHE,
      temp_root: None,
      seq_defline: None,
      qual_defline: None,
      table: None,
      join: JoinOptions::default(),
      force: false,
      append: false,
      use_stdout: false,
    }
  }

  /// Clamps resource knobs and validates flag combinations; called once
  /// before any thread is started.
  pub fn validated(mut self) -> Result<Self> {
    self.num_threads = self.num_threads.max(MIN_NUM_THREADS);
    self.buf_size = self.buf_size.min(MAX_BUF_SIZE);

    if self.use_stdout {
      if self.format.is_multi_bucket() {
        return Err(DumpError::Usage(
          "stdout output cannot be combined with split-files or split-3".into(),
        ));
      }
      // stdout disables overwrite and append handling
      self.force = false;
      self.append = false;
      if self.output.is_some() {
        return Err(DumpError::Usage(
          "stdout output cannot be combined with an output file".into(),
        ));
      }
    }

    if self.force && self.append {
      return Err(DumpError::Usage(
        "force and append are mutually exclusive".into(),
      ));
    }

    Ok(self)
  }
}
