use crate::archive::{READ_TYPE_BIOLOGICAL, RowRange, SequenceTable, SpotRecord};
use crate::error::{DumpError, Result};
use log::warn;

/// Sequence-table iterator: wraps a raw table scan and enforces the row
/// geometry the join relies on.
///
/// - `READ_LEN` and `READ_TYPE` must agree in length; a missing `READ_TYPE`
///   column is synthesized as all-biological forward reads.
/// - Aligned spots carry at most two alignment ids; more is a data error
///   (the composite key cannot express a third read).
/// - A `QUALITY` column whose width disagrees with `sum(READ_LEN)` is
///   reconciled against the summed length, which is ground truth in the
///   field: shorter quality is zero-padded, longer quality truncated.
pub struct SpotIterator<'a> {
  inner: Box<dyn Iterator<Item = Result<SpotRecord>> + Send + 'a>,
}

impl<'a> SpotIterator<'a> {
  pub fn open(table: &'a dyn SequenceTable, range: RowRange) -> Result<Self> {
    Ok(Self {
      inner: table.scan(range)?,
    })
  }
}

impl Iterator for SpotIterator<'_> {
  type Item = Result<SpotRecord>;

  fn next(&mut self) -> Option<Self::Item> {
    let record = match self.inner.next()? {
      Ok(record) => record,
      Err(err) => return Some(Err(err)),
    };
    Some(validate(record))
  }
}

fn validate(mut record: SpotRecord) -> Result<SpotRecord> {
  if record.read_len.is_empty() {
    record.read_len = vec![record.bases.len() as u32];
  }

  if record.read_type.is_empty() {
    record.read_type = vec![READ_TYPE_BIOLOGICAL; record.read_len.len()];
  }

  if record.read_len.len() != record.read_type.len() {
    return Err(DumpError::DataInvalid(format!(
      "spot {}: READ_LEN has {} entries but READ_TYPE has {}",
      record.row_id,
      record.read_len.len(),
      record.read_type.len()
    )));
  }

  if record.prim_alig_ids.len() > 2 {
    return Err(DumpError::DataInvalid(format!(
      "spot {}: {} alignment ids; at most two reads per spot are supported",
      record.row_id,
      record.prim_alig_ids.len()
    )));
  }

  let spot_len = record.spot_len() as usize;
  if !record.quality.is_empty() && record.quality.len() != spot_len {
    warn!(
      "spot {}: quality width {} disagrees with sum(READ_LEN) {}; re-reading with corrected length",
      record.row_id,
      record.quality.len(),
      spot_len
    );
    record.quality.resize(spot_len, 0);
  }

  Ok(record)
}
