use crate::config::OutputFormat;
use crate::error::{DumpError, Result};
use std::fmt::Write;

/// Defline template engine.
///
/// A template such as `@$ac.$si/$ri $sn length=$rl` is compiled once into a
/// sequence of literal segments and typed placeholders, then rendered per
/// record into a reusable buffer. String variables: `$ac` accession, `$sn`
/// spot name, `$sg` spot group. Integer variables: `$si` spot id, `$ri`
/// read id, `$rl` read length. An empty spot name falls back to the spot id,
/// its declared integer alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
  Literal(String),
  Accession,
  SpotName,
  SpotGroup,
  SpotId,
  ReadId,
  ReadLen,
}

#[derive(Debug, Clone)]
pub struct Defline {
  segments: Vec<Segment>,
}

/// Values a single record exposes to the template.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeflineContext<'a> {
  pub accession: &'a str,
  pub spot_name: Option<&'a str>,
  pub spot_group: Option<&'a str>,
  pub spot_id: i64,
  pub read_id: u32,
  pub read_len: u64,
}

impl Defline {
  pub fn compile(template: &str) -> Result<Self> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars();

    while let Some(ch) = chars.next() {
      if ch != '$' {
        literal.push(ch);
        continue;
      }
      let code: String = chars.by_ref().take(2).collect();
      let segment = match code.as_str() {
        "ac" => Segment::Accession,
        "sn" => Segment::SpotName,
        "sg" => Segment::SpotGroup,
        "si" => Segment::SpotId,
        "ri" => Segment::ReadId,
        "rl" => Segment::ReadLen,
        other => {
          return Err(DumpError::Usage(format!(
            "unrecognized defline variable '${other}' in '{template}'"
          )));
        }
      };
      if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(&mut literal)));
      }
      segments.push(segment);
    }
    if !literal.is_empty() {
      segments.push(Segment::Literal(literal));
    }
    Ok(Self { segments })
  }

  /// Appends the rendered defline to `out` (no trailing newline).
  pub fn render(&self, ctx: &DeflineContext<'_>, out: &mut String) {
    for segment in &self.segments {
      match segment {
        Segment::Literal(text) => out.push_str(text),
        Segment::Accession => out.push_str(ctx.accession),
        Segment::SpotName => match ctx.spot_name {
          Some(name) if !name.is_empty() => out.push_str(name),
          // integer alternative of the name variable
          _ => {
            let _ = write!(out, "{}", ctx.spot_id);
          }
        },
        Segment::SpotGroup => {
          if let Some(group) = ctx.spot_group {
            out.push_str(group);
          }
        }
        Segment::SpotId => {
          let _ = write!(out, "{}", ctx.spot_id);
        }
        Segment::ReadId => {
          let _ = write!(out, "{}", ctx.read_id);
        }
        Segment::ReadLen => {
          let _ = write!(out, "{}", ctx.read_len);
        }
      }
    }
  }
}

/// The compiled sequence and quality deflines of one run.
#[derive(Debug, Clone)]
pub struct DeflineSet {
  pub seq: Defline,
  pub qual: Defline,
}

impl DeflineSet {
  /// Compiles the user templates, or the format's defaults when absent.
  ///
  /// Split modes carry the read number; FASTA deflines are id-only by
  /// default, FASTQ deflines carry name and length.
  pub fn resolve(
    fmt: OutputFormat,
    print_read_nr: bool,
    seq_template: Option<&str>,
    qual_template: Option<&str>,
  ) -> Result<Self> {
    let with_read_nr = print_read_nr || fmt.prints_read_number();
    let (dflt_seq, dflt_qual) = if fmt.is_fasta() {
      if with_read_nr {
        (">$ac.$si.$ri", "")
      } else {
        (">$ac.$si", "")
      }
    } else if with_read_nr {
      ("@$ac.$si/$ri $sn length=$rl", "+$ac.$si/$ri $sn length=$rl")
    } else {
      ("@$ac.$si $sn length=$rl", "+$ac.$si $sn length=$rl")
    };

    Ok(Self {
      seq: Defline::compile(seq_template.unwrap_or(dflt_seq))?,
      qual: Defline::compile(qual_template.unwrap_or(dflt_qual))?,
    })
  }
}
