use crate::archive::{
  AlignmentRecord, AlignmentTable, Archive, RowRange, SequenceTable, SpotRecord,
};
use crate::error::{DumpError, IoContext, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Self-contained archive backend over a serde_json document.
///
/// This is the shipped stand-in for the columnar runtime: synthetic archives
/// in tests are built from these documents, and the CLI accepts them as
/// input. Row ids are `first_row + position`; alignment rows are stored in
/// alignment-row order, not key order, exactly like the real table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveDoc {
  pub accession: String,
  #[serde(default = "default_platform")]
  pub platform: String,
  pub tables: Vec<SeqTableDoc>,
  #[serde(default)]
  pub alignment: Option<AlignTableDoc>,
}

fn default_platform() -> String {
  "ILLUMINA".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeqTableDoc {
  pub name: String,
  #[serde(default = "default_first_row")]
  pub first_row: i64,
  pub spots: Vec<SpotDoc>,
}

fn default_first_row() -> i64 {
  1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotDoc {
  #[serde(default)]
  pub name: Option<String>,
  /// PRIMARY_ALIGNMENT_ID per read; 0 means the read's bases are inline.
  #[serde(default)]
  pub alig_ids: Vec<u64>,
  /// CMP_READ for aligned archives, READ for flat tables.
  #[serde(default)]
  pub read: String,
  #[serde(default)]
  pub quality: Vec<u8>,
  #[serde(default)]
  pub read_len: Vec<u32>,
  #[serde(default)]
  pub read_type: Vec<u8>,
  #[serde(default)]
  pub spot_group: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignTableDoc {
  #[serde(default = "default_first_row")]
  pub first_row: i64,
  pub rows: Vec<AlignDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignDoc {
  pub spot_id: i64,
  pub read_id: u32,
  pub read: String,
}

#[derive(Debug)]
pub struct JsonArchive {
  doc: ArchiveDoc,
}

impl JsonArchive {
  /// `cache_size` plays the role of the columnar runtime's cursor cache:
  /// it sizes the read buffer the document is parsed through.
  pub fn open(path: &Path, cache_size: usize) -> Result<Self> {
    let file = File::open(path).op("opening archive")?;
    let reader = BufReader::with_capacity(cache_size.clamp(64 * 1024, 64 * 1024 * 1024), file);
    let doc: ArchiveDoc = serde_json::from_reader(reader)
      .map_err(|err| DumpError::DataInvalid(format!("malformed archive document: {err}")))?;
    Ok(Self::from_doc(doc))
  }

  pub fn from_doc(doc: ArchiveDoc) -> Self {
    Self { doc }
  }
}

impl Archive for JsonArchive {
  fn accession(&self) -> &str {
    &self.doc.accession
  }

  fn platform(&self) -> &str {
    &self.doc.platform
  }

  fn table_names(&self) -> Vec<String> {
    self.doc.tables.iter().map(|table| table.name.clone()).collect_vec()
  }

  fn sequence_table(&self, name: &str) -> Result<&dyn SequenceTable> {
    self
      .doc
      .tables
      .iter()
      .find(|table| table.name == name)
      .map(|table| table as &dyn SequenceTable)
      .ok_or_else(|| {
        DumpError::DataInvalid(format!(
          "archive '{}' has no table '{name}' (available: {})",
          self.doc.accession,
          self.doc.tables.iter().map(|table| &table.name).join(", ")
        ))
      })
  }

  fn alignment_table(&self) -> Option<&dyn AlignmentTable> {
    self
      .doc
      .alignment
      .as_ref()
      .map(|table| table as &dyn AlignmentTable)
  }
}

fn clamp_range(table_first: i64, table_len: usize, range: RowRange) -> std::ops::Range<usize> {
  let start = (range.first - table_first).max(0) as usize;
  let end = ((range.end() - table_first).max(0) as usize).min(table_len);
  start.min(table_len)..end
}

impl SequenceTable for SeqTableDoc {
  fn name(&self) -> &str {
    &self.name
  }

  fn row_range(&self) -> RowRange {
    RowRange::new(self.first_row, self.spots.len() as u64)
  }

  fn has_name_column(&self) -> bool {
    self.spots.iter().any(|spot| spot.name.is_some())
  }

  fn scan(&self, range: RowRange) -> Result<Box<dyn Iterator<Item = Result<SpotRecord>> + Send + '_>> {
    let span = clamp_range(self.first_row, self.spots.len(), range);
    let first_row = self.first_row;
    let iter = self.spots[span.clone()]
      .iter()
      .zip(span)
      .map(move |(spot, pos)| {
        Ok(SpotRecord {
          row_id: first_row + pos as i64,
          name: spot.name.clone(),
          prim_alig_ids: spot.alig_ids.clone(),
          bases: spot.read.as_bytes().to_vec(),
          quality: spot.quality.clone(),
          read_len: if spot.read_len.is_empty() {
            vec![spot.read.len() as u32]
          } else {
            spot.read_len.clone()
          },
          read_type: spot.read_type.clone(),
          spot_group: spot.spot_group.clone(),
        })
      });
    Ok(Box::new(iter))
  }
}

impl AlignmentTable for AlignTableDoc {
  fn row_range(&self) -> RowRange {
    RowRange::new(self.first_row, self.rows.len() as u64)
  }

  fn scan(
    &self,
    range: RowRange,
  ) -> Result<Box<dyn Iterator<Item = Result<AlignmentRecord>> + Send + '_>> {
    let span = clamp_range(self.first_row, self.rows.len(), range);
    let first_row = self.first_row;
    let iter = self.rows[span.clone()].iter().zip(span).map(move |(row, pos)| {
      Ok(AlignmentRecord {
        row_id: first_row + pos as i64,
        spot_id: row.spot_id,
        read_id: row.read_id,
        bases: row.read.as_bytes().to_vec(),
      })
    });
    Ok(Box::new(iter))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn sample_doc() -> ArchiveDoc {
    ArchiveDoc {
      accession: "ACC".into(),
      platform: default_platform(),
      tables: vec![SeqTableDoc {
        name: "SEQUENCE".into(),
        first_row: 1,
        spots: vec![
          SpotDoc {
            read: "ACGTA".into(),
            read_len: vec![5],
            read_type: vec![READ_TYPE_BIO],
            ..SpotDoc::default()
          },
          SpotDoc {
            read: "CCGG".into(),
            read_len: vec![4],
            read_type: vec![READ_TYPE_BIO],
            ..SpotDoc::default()
          },
        ],
      }],
      alignment: Some(AlignTableDoc {
        first_row: 1,
        rows: vec![AlignDoc {
          spot_id: 1,
          read_id: 1,
          read: "AAAA".into(),
        }],
      }),
    }
  }

  const READ_TYPE_BIO: u8 = crate::archive::READ_TYPE_BIOLOGICAL;

  #[test]
  fn scan_yields_row_ids_and_owned_records() {
    let archive = JsonArchive::from_doc(sample_doc());
    let table = archive.sequence_table("SEQUENCE").unwrap();
    assert_eq!(table.row_range(), RowRange::new(1, 2));

    let records: Vec<SpotRecord> = table
      .scan(RowRange::new(1, 2))
      .unwrap()
      .collect::<Result<_>>()
      .unwrap();
    assert_eq!(records[0].row_id, 1);
    assert_eq!(records[0].bases, b"ACGTA");
    assert_eq!(records[1].row_id, 2);
  }

  #[test]
  fn scan_clamps_out_of_range_requests() {
    let archive = JsonArchive::from_doc(sample_doc());
    let table = archive.sequence_table("SEQUENCE").unwrap();
    let records: Vec<SpotRecord> = table
      .scan(RowRange::new(2, 10))
      .unwrap()
      .collect::<Result<_>>()
      .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].row_id, 2);
  }

  #[test]
  fn missing_table_is_reported() {
    let archive = JsonArchive::from_doc(sample_doc());
    assert!(archive.sequence_table("CONSENSUS").is_err());
  }

  #[test]
  fn document_roundtrips_through_json() {
    let doc = sample_doc();
    let text = serde_json::to_string(&doc).unwrap();
    let parsed: ArchiveDoc = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.accession, "ACC");
    assert_eq!(parsed.tables[0].spots.len(), 2);
    assert!(parsed.alignment.is_some());
  }
}
