use crate::codec::key::Key;
use crate::codec::pack;
use crate::error::{DumpError, IoContext, Result};
use crate::lookup::index::IndexReader;
use crate::lookup::record;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

/// Read-only view over the final sorted lookup file.
///
/// Every join worker owns its own reader (and its own file handle), so the
/// workers never contend on a seek position. A probe beyond the index's
/// `max_key` fails without touching the file; everything else jumps to the
/// nearest checkpoint and scans forward, which the index stride bounds.
#[derive(Debug)]
pub struct LookupReader {
  reader: BufReader<File>,
  index: Option<IndexReader>,
  pos: u64,
  size: u64,
  buf: Vec<u8>,
}

impl LookupReader {
  pub fn open(lookup_path: &Path, index: Option<IndexReader>, buf_size: usize) -> Result<Self> {
    let file = File::open(lookup_path).op("opening lookup file")?;
    let size = file.metadata().op("reading lookup file size")?.len();
    Ok(Self {
      reader: BufReader::with_capacity(buf_size.max(4096), file),
      index,
      pos: 0,
      size,
      buf: Vec::new(),
    })
  }

  pub fn size(&self) -> u64 {
    self.size
  }

  pub fn max_key(&self) -> Option<Key> {
    self.index.as_ref().map(IndexReader::max_key)
  }

  fn set_pos(&mut self, pos: u64) -> Result<()> {
    self.reader
      .seek(SeekFrom::Start(pos))
      .op("seeking lookup file")?;
    self.pos = pos;
    Ok(())
  }

  /// Positions the reader at `key`.
  ///
  /// With `exact`, scans forward from the nearest checkpoint until the key
  /// (or its read-2 sibling) is found, failing with `NotFound` once keys
  /// beyond it appear. Without `exact`, settles for the checkpoint itself
  /// and returns its key.
  pub fn seek(&mut self, key: Key, exact: bool) -> Result<Key> {
    let (max_key, nearest) = match &self.index {
      None => {
        self.set_pos(0)?;
        return self.scan_forward(key);
      }
      Some(index) => (index.max_key(), index.nearest_offset(key)),
    };

    if max_key.raw() > 0 && key.raw() > max_key.raw() {
      return Err(DumpError::not_found(key));
    }

    match nearest {
      Some((ckpt_key, offset)) => {
        self.set_pos(offset)?;
        if key.matches(ckpt_key) {
          Ok(ckpt_key)
        } else if exact {
          self.scan_forward(key)
        } else {
          Ok(ckpt_key)
        }
      }
      None => {
        self.set_pos(0)?;
        if exact {
          self.scan_forward(key)
        } else {
          Ok(Key::from_raw(0))
        }
      }
    }
  }

  /// Linear scan from the current position until `key` is reached or
  /// overshot. Leaves the reader positioned at the found record.
  fn scan_forward(&mut self, key: Key) -> Result<Key> {
    loop {
      let Some((found, dna_len)) = record::read_header(&mut self.reader)? else {
        return Err(DumpError::not_found(key));
      };
      if key.matches(found) {
        self
          .reader
          .seek_relative(-(record::HEADER_LEN as i64))
          .op("rewinding lookup header")?;
        return Ok(found);
      }
      if key > found {
        let body_len = pack::packed_body_len(dna_len as usize) as i64;
        self
          .reader
          .seek_relative(body_len)
          .op("skipping lookup record")?;
        self.pos += record::HEADER_LEN as u64 + body_len as u64;
      } else {
        // overshot; leave the reader aligned on the record we stopped at
        self
          .reader
          .seek_relative(-(record::HEADER_LEN as i64))
          .op("rewinding lookup header")?;
        return Err(DumpError::not_found(key));
      }
    }
  }

  /// Reads the record at the current position, advancing past it.
  pub fn next(&mut self, packed: &mut Vec<u8>) -> Result<Option<Key>> {
    let key = record::read_record(&mut self.reader, packed)?;
    if key.is_some() {
      self.pos += record::disk_len(packed);
    }
    Ok(key)
  }

  /// Fetches and decodes the bases stored for `(spot_id, read_id)`.
  ///
  /// Fast path: the reader already sits on the requested record (workers
  /// walk spots in ascending order, which is also key order). Otherwise one
  /// exact re-seek is attempted; a mismatch after that is `NotFound`, never
  /// a silent substitution.
  pub fn lookup_bases(
    &mut self,
    spot_id: i64,
    read_id: u32,
    reverse: bool,
    bases: &mut Vec<u8>,
  ) -> Result<()> {
    let want = Key::new(spot_id, read_id);

    let found = self.next_into_scratch()?;
    if found == Some(want) {
      let buf = std::mem::take(&mut self.buf);
      let res = pack::unpack(&buf, reverse, bases);
      self.buf = buf;
      return res;
    }

    self.seek(want, true)?;
    let found = self.next_into_scratch()?;
    if found == Some(want) {
      let buf = std::mem::take(&mut self.buf);
      let res = pack::unpack(&buf, reverse, bases);
      self.buf = buf;
      res
    } else {
      Err(DumpError::not_found(want))
    }
  }

  fn next_into_scratch(&mut self) -> Result<Option<Key>> {
    let mut buf = std::mem::take(&mut self.buf);
    let res = self.next(&mut buf);
    self.buf = buf;
    res
  }

  /// Verifies that the whole file is strictly ascending by key; returns the
  /// record count.
  pub fn check(&mut self) -> Result<u64> {
    self.set_pos(0)?;
    let mut count = 0u64;
    let mut last: Option<Key> = None;
    while let Some(key) = self.next_into_scratch()? {
      if let Some(last) = last {
        if key <= last {
          return Err(DumpError::DataInvalid(format!(
            "lookup order violation: key {} after {}",
            key.raw(),
            last.raw()
          )));
        }
      }
      last = Some(key);
      count += 1;
    }
    Ok(count)
  }

  /// Number of records in the file.
  pub fn count(&mut self) -> Result<u64> {
    self.set_pos(0)?;
    let mut count = 0u64;
    while self.next_into_scratch()?.is_some() {
      count += 1;
    }
    Ok(count)
  }
}
