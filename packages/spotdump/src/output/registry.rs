use crate::error::{DumpError, IoContext, Result};
use crate::output::cleanup::CleanupRegistry;
use log::info;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Registry of per-worker output parts, keyed by output-stream bucket.
///
/// Bucket 0 concatenates into the output path as given; bucket `n` into
/// `stem_n.ext`. Parts are registered in shard order, and concatenation
/// preserves that order, so the final output is deterministic for a given
/// sharding.
#[derive(Debug, Default)]
pub struct TempRegistry {
  buckets: BTreeMap<u32, Vec<PathBuf>>,
}

/// `out.fastq` + bucket 2 → `out_2.fastq`; bucket 0 keeps the name.
pub fn bucket_filename(output: &Path, bucket: u32) -> PathBuf {
  if bucket == 0 {
    return output.to_path_buf();
  }
  let stem = output
    .file_stem()
    .and_then(|stem| stem.to_str())
    .unwrap_or("out");
  let name = match output.extension().and_then(|ext| ext.to_str()) {
    Some(ext) => format!("{stem}_{bucket}.{ext}"),
    None => format!("{stem}_{bucket}"),
  };
  output.with_file_name(name)
}

impl TempRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, bucket: u32, path: PathBuf) {
    self.buckets.entry(bucket).or_default().push(path);
  }

  pub fn bucket_count(&self) -> usize {
    self.buckets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buckets.is_empty()
  }

  /// Final file each registered bucket would concatenate into.
  pub fn final_paths(&self, output: &Path) -> Vec<PathBuf> {
    self
      .buckets
      .keys()
      .map(|&bucket| bucket_filename(output, bucket))
      .collect()
  }

  /// Concatenates every bucket into its final file, honoring the
  /// overwrite/append flags, and deletes the source parts.
  pub fn concat_to_files(
    self,
    output: &Path,
    buf_size: usize,
    force: bool,
    append: bool,
    cleanup: &CleanupRegistry,
  ) -> Result<Vec<PathBuf>> {
    let mut finals = Vec::new();
    for (&bucket, parts) in &self.buckets {
      let target = bucket_filename(output, bucket);
      let file = open_target(&target, force, append)?;
      let mut writer = BufWriter::with_capacity(buf_size, file);
      for part in parts {
        copy_part(part, &mut writer, buf_size)?;
        cleanup.delete_file(part);
      }
      writer.flush().op("flushing final output")?;
      info!("wrote '{}'", target.display());
      finals.push(target);
    }
    Ok(finals)
  }

  /// Streams the single bucket to standard output in part order.
  pub fn concat_to_stdout(self, buf_size: usize, cleanup: &CleanupRegistry) -> Result<()> {
    if self.bucket_count() > 1 {
      return Err(DumpError::Usage(
        "this format writes multiple output files and cannot stream to stdout".into(),
      ));
    }
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    for parts in self.buckets.values() {
      for part in parts {
        copy_part(part, &mut writer, buf_size)?;
        cleanup.delete_file(part);
      }
    }
    writer.flush().op("flushing stdout")?;
    Ok(())
  }
}

fn open_target(target: &Path, force: bool, append: bool) -> Result<File> {
  if append {
    return OpenOptions::new()
      .create(true)
      .append(true)
      .open(target)
      .op("opening final output for append");
  }
  if !force && target.exists() {
    return Err(DumpError::Usage(format!(
      "output file '{}' already exists; use force or append",
      target.display()
    )));
  }
  File::create(target).op("creating final output")
}

fn copy_part(part: &Path, writer: &mut impl Write, buf_size: usize) -> Result<()> {
  let file = File::open(part).op("opening output part")?;
  let mut reader = BufReader::with_capacity(buf_size, file);
  io::copy(&mut reader, writer).op("concatenating output part")?;
  Ok(())
}
