use crate::error::{IoContext, Result};
use std::io::Write;

/// Phred byte → printable ASCII with the +33 offset, saturating at `~`.
const fn build_qual_table() -> [u8; 256] {
  let mut table = [b'~'; 256];
  let mut value = 0usize;
  while value < 256 {
    let shifted = value + 33;
    table[value] = if shifted >= b'~' as usize {
      b'~'
    } else {
      shifted as u8
    };
    value += 1;
  }
  table
}

static QUAL_TO_ASCII: [u8; 256] = build_qual_table();

/// Maps raw quality bytes into printable ASCII (cleared first).
pub fn quality_to_ascii(raw: &[u8], out: &mut Vec<u8>) {
  out.clear();
  out.extend(raw.iter().map(|&value| QUAL_TO_ASCII[value as usize]));
}

/// One FASTQ record: defline, bases, quality defline, quality.
pub fn write_fastq(
  out: &mut impl Write,
  seq_defline: &str,
  bases: &[u8],
  qual_defline: &str,
  qual_ascii: &[u8],
) -> Result<()> {
  out.write_all(seq_defline.as_bytes()).op("writing defline")?;
  out.write_all(b"\n").op("writing record")?;
  out.write_all(bases).op("writing bases")?;
  out.write_all(b"\n").op("writing record")?;
  out.write_all(qual_defline.as_bytes()).op("writing defline")?;
  out.write_all(b"\n").op("writing record")?;
  out.write_all(qual_ascii).op("writing quality")?;
  out.write_all(b"\n").op("writing record")?;
  Ok(())
}

/// One FASTA record: defline and bases.
pub fn write_fasta(out: &mut impl Write, defline: &str, bases: &[u8]) -> Result<()> {
  out.write_all(defline.as_bytes()).op("writing defline")?;
  out.write_all(b"\n").op("writing record")?;
  out.write_all(bases).op("writing bases")?;
  out.write_all(b"\n").op("writing record")?;
  Ok(())
}
