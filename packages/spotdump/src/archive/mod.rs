pub mod json;
pub mod seq_iter;

use crate::error::Result;

/// READ_TYPE bit flags. Bit 0 marks a biological (vs technical) read,
/// bit 2 a reverse-oriented one.
pub const READ_TYPE_BIOLOGICAL: u8 = 0x01;
pub const READ_TYPE_REVERSE: u8 = 0x04;

/// One row of the sequence (or consensus) table.
///
/// `bases` holds the CMP_READ column for databases with an alignment table
/// (inline bases of unaligned segments only) and the full READ column for
/// flat tables. `quality` is raw phred bytes, mapped to ASCII only at
/// formatting time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpotRecord {
  pub row_id: i64,
  pub name: Option<String>,
  pub prim_alig_ids: Vec<u64>,
  pub bases: Vec<u8>,
  pub quality: Vec<u8>,
  pub read_len: Vec<u32>,
  pub read_type: Vec<u8>,
  pub spot_group: Option<String>,
}

impl SpotRecord {
  /// Total base count of the spot, `sum(READ_LEN)`.
  pub fn spot_len(&self) -> u64 {
    self.read_len.iter().map(|&len| u64::from(len)).sum()
  }

  pub fn is_aligned(&self) -> bool {
    self.prim_alig_ids.iter().any(|&id| id != 0)
  }
}

/// One row of the primary-alignment table. `bases` are unpacked IUPAC
/// ASCII, always stored in forward orientation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentRecord {
  pub row_id: i64,
  pub spot_id: i64,
  pub read_id: u32,
  pub bases: Vec<u8>,
}

/// Contiguous row interval `[first, first + count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
  pub first: i64,
  pub count: u64,
}

impl RowRange {
  pub fn new(first: i64, count: u64) -> Self {
    Self { first, count }
  }

  pub fn end(&self) -> i64 {
    self.first + self.count as i64
  }
}

/// Stated interface of the columnar runtime's sequence table. Implementors
/// provide cursor-style scans over row ranges; records are yielded owned, so
/// consumers never borrow into cursor internals.
pub trait SequenceTable: Sync {
  fn name(&self) -> &str;
  fn row_range(&self) -> RowRange;
  fn has_name_column(&self) -> bool;
  fn scan(&self, range: RowRange) -> Result<Box<dyn Iterator<Item = Result<SpotRecord>> + Send + '_>>;
}

/// Stated interface of the primary-alignment table.
pub trait AlignmentTable: Sync {
  fn row_range(&self) -> RowRange;
  fn scan(
    &self,
    range: RowRange,
  ) -> Result<Box<dyn Iterator<Item = Result<AlignmentRecord>> + Send + '_>>;
}

/// Stated interface of an opened accession.
pub trait Archive: Sync {
  fn accession(&self) -> &str;
  /// Platform tag as recorded in the archive, e.g. `ILLUMINA` or `PACBIO`.
  fn platform(&self) -> &str;
  fn table_names(&self) -> Vec<String>;
  fn sequence_table(&self, name: &str) -> Result<&dyn SequenceTable>;
  /// `None` for flat (unaligned) archives.
  fn alignment_table(&self) -> Option<&dyn AlignmentTable>;

  fn is_database(&self) -> bool {
    self.alignment_table().is_some()
  }
}
