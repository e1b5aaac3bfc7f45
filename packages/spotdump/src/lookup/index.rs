use crate::codec::key::Key;
use crate::error::{DumpError, IoContext, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Sparse key→offset index over the final sorted lookup file.
///
/// The file-merger records a checkpoint every `stride` records during the
/// final merge round; a probe for key K then starts a linear scan at the
/// greatest checkpoint key ≤ K and is guaranteed to settle within fewer than
/// `stride` record reads. `max_key` short-circuits out-of-range probes
/// without touching the lookup file at all.
pub const INDEX_MAGIC: [u8; 8] = *b"SDIX0001";
pub const INDEX_VERSION: u32 = 1;

pub const DFLT_INDEX_STRIDE: u64 = 4096;

#[derive(Debug)]
pub struct IndexWriter {
  stride: u64,
  checkpoints: Vec<(u64, u64)>,
  max_key: u64,
  count: u64,
}

impl IndexWriter {
  pub fn new(stride: u64) -> Self {
    Self {
      stride: stride.max(1),
      checkpoints: Vec::new(),
      max_key: 0,
      count: 0,
    }
  }

  /// Notes one record about to be written at `offset` in the lookup file.
  pub fn record(&mut self, key: Key, offset: u64) {
    if self.count % self.stride == 0 {
      self.checkpoints.push((key.raw(), offset));
    }
    self.max_key = key.raw();
    self.count += 1;
  }

  pub fn count(&self) -> u64 {
    self.count
  }

  pub fn finish(self, path: &Path) -> Result<()> {
    let file = File::create(path).op("creating index file")?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&INDEX_MAGIC).op("writing index header")?;
    writer
      .write_all(&INDEX_VERSION.to_le_bytes())
      .op("writing index header")?;
    writer
      .write_all(&self.stride.to_le_bytes())
      .op("writing index header")?;
    writer
      .write_all(&self.max_key.to_le_bytes())
      .op("writing index header")?;
    writer
      .write_all(&(self.checkpoints.len() as u64).to_le_bytes())
      .op("writing index header")?;
    for (key, offset) in &self.checkpoints {
      writer
        .write_all(&key.to_le_bytes())
        .op("writing index checkpoint")?;
      writer
        .write_all(&offset.to_le_bytes())
        .op("writing index checkpoint")?;
    }
    writer.flush().op("flushing index file")?;
    Ok(())
  }
}

#[derive(Debug, Clone)]
pub struct IndexReader {
  stride: u64,
  max_key: u64,
  checkpoints: Vec<(u64, u64)>,
}

impl IndexReader {
  pub fn open(path: &Path) -> Result<Self> {
    let file = File::open(path).op("opening index file")?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).op("reading index header")?;
    if magic != INDEX_MAGIC {
      return Err(DumpError::DataInvalid(format!(
        "index file '{}' has a foreign magic",
        path.display()
      )));
    }
    let version = read_u32(&mut reader)?;
    if version != INDEX_VERSION {
      return Err(DumpError::DataInvalid(format!(
        "index version {version} is not supported"
      )));
    }
    let stride = read_u64(&mut reader)?;
    let max_key = read_u64(&mut reader)?;
    let count = read_u64(&mut reader)?;

    let mut checkpoints = Vec::with_capacity(count as usize);
    let mut last_key = 0u64;
    for _ in 0..count {
      let key = read_u64(&mut reader)?;
      let offset = read_u64(&mut reader)?;
      if !checkpoints.is_empty() && key <= last_key {
        return Err(DumpError::DataInvalid(
          "index checkpoints are not strictly ascending".into(),
        ));
      }
      last_key = key;
      checkpoints.push((key, offset));
    }

    Ok(Self {
      stride,
      max_key,
      checkpoints,
    })
  }

  pub fn stride(&self) -> u64 {
    self.stride
  }

  pub fn max_key(&self) -> Key {
    Key::from_raw(self.max_key)
  }

  /// Greatest checkpoint with key ≤ the probed key, or `None` when the probe
  /// precedes the first checkpoint.
  pub fn nearest_offset(&self, key: Key) -> Option<(Key, u64)> {
    let idx = self
      .checkpoints
      .partition_point(|&(ckpt, _)| ckpt <= key.raw());
    if idx == 0 {
      return None;
    }
    let (ckpt_key, offset) = self.checkpoints[idx - 1];
    Some((Key::from_raw(ckpt_key), offset))
  }
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
  let mut buf = [0u8; 4];
  reader.read_exact(&mut buf).op("reading index field")?;
  Ok(u32::from_le_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> Result<u64> {
  let mut buf = [0u8; 8];
  reader.read_exact(&mut buf).op("reading index field")?;
  Ok(u64::from_le_bytes(buf))
}
