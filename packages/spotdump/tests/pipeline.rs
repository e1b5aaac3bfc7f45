//! End-to-end runs over synthetic in-memory archives.

use eyre::Report;
use pretty_assertions::assert_eq;
use spotdump::DumpError;
use spotdump::archive::json::{AlignDoc, AlignTableDoc, ArchiveDoc, SeqTableDoc, SpotDoc};
use spotdump::archive::{READ_TYPE_BIOLOGICAL, READ_TYPE_REVERSE};
use spotdump::config::{OutputFormat, RunConfig, resolve_skip_tech};
use spotdump::pipeline::{RunSummary, run_archive};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

const BIO: u8 = READ_TYPE_BIOLOGICAL;
const TECH: u8 = 0;
const BIO_REV: u8 = READ_TYPE_BIOLOGICAL | READ_TYPE_REVERSE;

fn archive(spots: Vec<SpotDoc>, alignment: Option<Vec<AlignDoc>>) -> ArchiveDoc {
  ArchiveDoc {
    accession: "ACC".into(),
    platform: "ILLUMINA".into(),
    tables: vec![SeqTableDoc {
      name: "SEQUENCE".into(),
      first_row: 1,
      spots,
    }],
    alignment: alignment.map(|rows| AlignTableDoc { first_row: 1, rows }),
  }
}

fn spot(read: &str, read_len: Vec<u32>, read_type: Vec<u8>, alig_ids: Vec<u64>) -> SpotDoc {
  let quality: Vec<u8> = vec![0; read_len.iter().map(|&len| len as usize).sum()];
  SpotDoc {
    name: None,
    alig_ids,
    read: read.into(),
    quality,
    read_len,
    read_type,
    spot_group: None,
  }
}

fn align(spot_id: i64, read_id: u32, read: &str) -> AlignDoc {
  AlignDoc {
    spot_id,
    read_id,
    read: read.into(),
  }
}

/// Runs the pipeline and returns the summary plus each final file's content,
/// keyed by file name.
fn run(
  doc: &ArchiveDoc,
  fmt: OutputFormat,
  tweak: impl FnOnce(&mut RunConfig),
) -> spotdump::Result<(RunSummary, BTreeMap<String, String>)> {
  let dir = tempfile::tempdir().unwrap();
  let mut cfg = RunConfig::new("unused.json", fmt);
  cfg.output = Some(dir.path().join("out.dat"));
  cfg.temp_root = Some(dir.path().to_path_buf());
  cfg.join.skip_tech = resolve_skip_tech(false, false, fmt);
  tweak(&mut cfg);
  let cfg = cfg.validated()?;

  let archive = spotdump::archive::json::JsonArchive::from_doc(doc.clone());
  let summary = run_archive(&archive, &cfg)?;

  let mut outputs = BTreeMap::new();
  for path in &summary.outputs {
    let name = path
      .file_name()
      .and_then(|name| name.to_str())
      .unwrap()
      .to_owned();
    outputs.insert(name, fs::read_to_string(path).unwrap());
  }
  Ok((summary, outputs))
}

#[test]
fn unaligned_flat_table_whole_spot_fastq() -> Result<(), Report> {
  let doc = archive(
    vec![
      spot("ACGTA", vec![5], vec![BIO], vec![]),
      spot("CCGG", vec![4], vec![BIO], vec![]),
      spot("TTTTAA", vec![6], vec![BIO], vec![]),
    ],
    None,
  );
  let (summary, outputs) = run(&doc, OutputFormat::FastqWholeSpot, |_| {})?;

  assert_eq!(summary.stats.spots_read, 3);
  assert_eq!(summary.stats.reads_written, 3);
  assert_eq!(
    outputs["out.dat"],
    "@ACC.1 1 length=5\n\
     ACGTA\n\
     +ACC.1 1 length=5\n\
     !!!!!\n\
     @ACC.2 2 length=4\n\
     CCGG\n\
     +ACC.2 2 length=4\n\
     !!!!\n\
     @ACC.3 3 length=6\n\
     TTTTAA\n\
     +ACC.3 3 length=6\n\
     !!!!!!\n"
  );
  Ok(())
}

#[test]
fn fully_aligned_spot_split_spot_fasta() -> Result<(), Report> {
  let doc = archive(
    vec![spot("", vec![4, 4], vec![BIO, BIO], vec![1, 2])],
    Some(vec![align(1, 1, "AAAA"), align(1, 2, "CCCC")]),
  );
  let (summary, outputs) = run(&doc, OutputFormat::FastaSplitSpot, |_| {})?;

  assert_eq!(summary.stats.reads_written, 2);
  assert_eq!(outputs["out.dat"], ">ACC.1.1\nAAAA\n>ACC.1.2\nCCCC\n");
  Ok(())
}

#[test]
fn mixed_spot_whole_spot_fasta() {
  let doc = archive(
    vec![spot("GGGG", vec![4, 4], vec![BIO, BIO], vec![0, 7])],
    Some(vec![align(1, 2, "TTTT")]),
  );
  let (_, outputs) = run(&doc, OutputFormat::FastaWholeSpot, |_| {}).unwrap();
  assert_eq!(outputs["out.dat"], ">ACC.1\nGGGGTTTT\n");
}

#[test]
fn reverse_read_is_complemented_on_the_way_out() {
  let doc = archive(
    vec![spot("GG", vec![2, 4], vec![BIO, BIO_REV], vec![0, 3])],
    Some(vec![align(1, 2, "AACG")]),
  );
  let (_, outputs) = run(&doc, OutputFormat::FastaWholeSpot, |_| {}).unwrap();
  assert_eq!(outputs["out.dat"], ">ACC.1\nGGCGTT\n");
}

#[test]
fn min_read_len_filters_everything_out() {
  let doc = archive(
    vec![spot("ACGTACCGG", vec![5, 4], vec![BIO, BIO], vec![])],
    None,
  );
  let (summary, outputs) = run(&doc, OutputFormat::FastqSplitSpot, |cfg| {
    cfg.join.min_read_len = 10;
  })
  .unwrap();

  assert_eq!(summary.stats.reads_written, 0);
  assert_eq!(summary.stats.reads_too_short, 2);
  assert!(outputs.is_empty());
}

#[test]
fn lookup_miss_is_counted_and_skipped() {
  // spot 2 references an alignment row that does not exist
  let doc = archive(
    vec![
      spot("", vec![4], vec![BIO], vec![1]),
      spot("", vec![4], vec![BIO], vec![9]),
    ],
    Some(vec![align(1, 1, "AAAA")]),
  );
  let (summary, outputs) = run(&doc, OutputFormat::FastaSplitSpot, |_| {}).unwrap();
  assert_eq!(summary.stats.reads_written, 1);
  assert_eq!(summary.stats.reads_invalid, 1);
  assert_eq!(outputs["out.dat"], ">ACC.1.1\nAAAA\n");
}

#[test]
fn lookup_miss_under_strict_mode_fails_the_run() {
  let doc = archive(
    vec![spot("", vec![4], vec![BIO], vec![9])],
    Some(vec![align(2, 1, "AAAA")]),
  );
  let res = run(&doc, OutputFormat::FastaSplitSpot, |cfg| {
    cfg.join.terminate_on_invalid = true;
  });
  assert!(matches!(res, Err(DumpError::NotFound { .. })));
}

#[test]
fn split_files_route_reads_by_read_number() {
  let doc = archive(
    vec![
      spot("AAAACCCC", vec![4, 4], vec![BIO, BIO], vec![]),
      spot("GGGGTTTT", vec![4, 4], vec![BIO, BIO], vec![]),
    ],
    None,
  );
  let (_, outputs) = run(&doc, OutputFormat::FastqSplitFile, |_| {}).unwrap();

  assert_eq!(
    outputs["out_1.dat"],
    "@ACC.1/1 1 length=4\nAAAA\n+ACC.1/1 1 length=4\n!!!!\n\
     @ACC.2/1 2 length=4\nGGGG\n+ACC.2/1 2 length=4\n!!!!\n"
  );
  assert_eq!(
    outputs["out_2.dat"],
    "@ACC.1/2 1 length=4\nCCCC\n+ACC.1/2 1 length=4\n!!!!\n\
     @ACC.2/2 2 length=4\nTTTT\n+ACC.2/2 2 length=4\n!!!!\n"
  );
}

#[test]
fn split_3_sends_singletons_to_the_base_file() {
  let doc = archive(
    vec![
      spot("AAAACCCC", vec![4, 4], vec![BIO, BIO], vec![]),
      spot("GGG", vec![3], vec![BIO], vec![]),
    ],
    None,
  );
  let (_, outputs) = run(&doc, OutputFormat::FastaSplit3, |_| {}).unwrap();

  assert_eq!(outputs["out.dat"], ">ACC.2.1\nGGG\n");
  assert_eq!(outputs["out_1.dat"], ">ACC.1.1\nAAAA\n");
  assert_eq!(outputs["out_2.dat"], ">ACC.1.2\nCCCC\n");
}

#[test]
fn technical_reads_are_skipped_in_split_modes() {
  let doc = archive(
    vec![spot("AAAATT", vec![4, 2], vec![BIO, TECH], vec![])],
    None,
  );
  let (summary, outputs) = run(&doc, OutputFormat::FastaSplitSpot, |_| {}).unwrap();
  assert_eq!(summary.stats.reads_technical, 1);
  assert_eq!(outputs["out.dat"], ">ACC.1.1\nAAAA\n");
}

#[test]
fn whole_spot_keeps_technical_reads_by_default() {
  let doc = archive(
    vec![spot("AAAATT", vec![4, 2], vec![BIO, TECH], vec![])],
    None,
  );
  let (_, outputs) = run(&doc, OutputFormat::FastaWholeSpot, |_| {}).unwrap();
  assert_eq!(outputs["out.dat"], ">ACC.1\nAAAATT\n");
}

#[test]
fn unsorted_fasta_bypasses_the_lookup() {
  let doc = archive(
    vec![spot("GGGG", vec![4, 4], vec![BIO, BIO], vec![0, 5])],
    Some(vec![align(1, 2, "TTTT")]),
  );
  let (summary, outputs) = run(&doc, OutputFormat::FastaUnsorted, |_| {}).unwrap();
  // only the inline read appears; the aligned mate is dropped silently
  assert_eq!(summary.stats.reads_written, 1);
  assert_eq!(outputs["out.dat"], ">ACC.1.1\nGGGG\n");
}

#[test]
fn base_filter_drops_non_matching_spots() {
  let doc = archive(
    vec![
      spot("GATTACA", vec![7], vec![BIO], vec![]),
      spot("CCCCCCC", vec![7], vec![BIO], vec![]),
    ],
    None,
  );
  let (_, outputs) = run(&doc, OutputFormat::FastaSplitSpot, |cfg| {
    cfg.join.filter_bases = Some(spotdump::join::filter::BaseFilter::new("GATT").unwrap());
  })
  .unwrap();
  assert_eq!(outputs["out.dat"], ">ACC.1.1\nGATTACA\n");
}

#[test]
fn only_aligned_and_only_unaligned_partition_the_spots() {
  let doc = archive(
    vec![
      spot("", vec![4], vec![BIO], vec![1]),
      spot("CCCC", vec![4], vec![BIO], vec![]),
    ],
    Some(vec![align(1, 1, "AAAA")]),
  );

  let (_, outputs) = run(&doc, OutputFormat::FastaSplitSpot, |cfg| {
    cfg.join.only_aligned = true;
  })
  .unwrap();
  assert_eq!(outputs["out.dat"], ">ACC.1.1\nAAAA\n");

  let (_, outputs) = run(&doc, OutputFormat::FastaSplitSpot, |cfg| {
    cfg.join.only_unaligned = true;
  })
  .unwrap();
  assert_eq!(outputs["out.dat"], ">ACC.2.1\nCCCC\n");
}

#[test]
fn pacbio_needs_the_unsorted_mode() {
  let mut doc = archive(vec![spot("ACGT", vec![4], vec![BIO], vec![])], None);
  doc.platform = "PACBIO".into();

  let res = run(&doc, OutputFormat::FastqSplit3, |_| {});
  assert!(matches!(res, Err(DumpError::Unsupported(_))));

  let (_, outputs) = run(&doc, OutputFormat::FastaUnsorted, |_| {}).unwrap();
  assert_eq!(outputs["out.dat"], ">ACC.1.1\nACGT\n");
}

#[test]
fn named_spots_use_the_name_unless_rowid_is_forced() {
  let mut named = spot("ACGT", vec![4], vec![BIO], vec![]);
  named.name = Some("POND-7".into());
  let doc = archive(vec![named], None);

  let (_, outputs) = run(&doc, OutputFormat::FastqWholeSpot, |_| {}).unwrap();
  assert!(outputs["out.dat"].starts_with("@ACC.1 POND-7 length=4\n"));

  let (_, outputs) = run(&doc, OutputFormat::FastqWholeSpot, |cfg| {
    cfg.join.rowid_as_name = true;
  })
  .unwrap();
  assert!(outputs["out.dat"].starts_with("@ACC.1 1 length=4\n"));
}

/// Out-of-core path: a memory budget far below the data size forces many
/// sub-vectors and multiple merge inputs, and the result must still be the
/// READ_TYPE-directed concatenation of inline and looked-up bases.
#[test]
fn large_aligned_archive_roundtrip_with_tiny_memory_budget() -> Result<(), Report> {
  let n = 300i64;
  let mut spots = Vec::new();
  let mut rows = Vec::new();
  for spot_id in 1..=n {
    spots.push(spot("", vec![8, 8], vec![BIO, BIO], vec![1, 1]));
    rows.push(align(spot_id, 1, &bases_for(spot_id, 1)));
    rows.push(align(spot_id, 2, &bases_for(spot_id, 2)));
  }
  let doc = archive(spots, Some(rows));

  let (summary, outputs) = run(&doc, OutputFormat::FastaSplitSpot, |cfg| {
    cfg.mem_limit = 64;
    cfg.num_threads = 3;
  })?;

  assert_eq!(summary.stats.reads_written, 2 * n as u64);
  let text = &outputs["out.dat"];
  assert!(text.contains(&format!(">ACC.1.1\n{}\n", bases_for(1, 1))));
  assert!(text.contains(&format!(">ACC.150.2\n{}\n", bases_for(150, 2))));
  assert!(text.contains(&format!(">ACC.300.1\n{}\n", bases_for(300, 1))));
  // spot order is monotonic across shard boundaries
  let first = text.find(">ACC.1.1\n").unwrap();
  let mid = text.find(">ACC.150.1\n").unwrap();
  let last = text.find(">ACC.300.2\n").unwrap();
  assert!(first < mid && mid < last);
  Ok(())
}

fn bases_for(spot_id: i64, read_id: u32) -> String {
  let alphabet = [b'A', b'C', b'G', b'T'];
  (0..8)
    .map(|idx| alphabet[((spot_id as usize) + idx + read_id as usize) % 4] as char)
    .collect()
}

/// Byte-wise determinism for a fixed worker count.
#[test]
fn output_is_identical_across_runs() -> Result<(), Report> {
  let spots: Vec<SpotDoc> = (1..=500)
    .map(|spot_id| {
      let text = bases_for(spot_id, 1);
      spot(&text, vec![8], vec![BIO], vec![])
    })
    .collect();
  let doc = archive(spots, None);

  let (_, first) = run(&doc, OutputFormat::FastqSplitSpot, |cfg| cfg.num_threads = 4)?;
  let (_, second) = run(&doc, OutputFormat::FastqSplitSpot, |cfg| cfg.num_threads = 4)?;
  assert_eq!(first, second);
  Ok(())
}

#[test]
fn existing_output_without_force_is_refused_before_any_work() {
  let doc = archive(vec![spot("ACGT", vec![4], vec![BIO], vec![])], None);
  let dir = tempfile::tempdir().unwrap();
  let out: PathBuf = dir.path().join("out.dat");
  fs::write(&out, "keep me").unwrap();

  let mut cfg = RunConfig::new("unused.json", OutputFormat::FastqWholeSpot);
  cfg.output = Some(out.clone());
  cfg.temp_root = Some(dir.path().to_path_buf());
  let cfg = cfg.validated().unwrap();

  let archive = spotdump::archive::json::JsonArchive::from_doc(doc);
  let res = run_archive(&archive, &cfg);
  assert!(matches!(res, Err(DumpError::Usage(_))));
  assert_eq!(fs::read_to_string(&out).unwrap(), "keep me");
}

#[test]
fn consensus_table_is_probed_automatically_but_explicit_table_wins() {
  let mut doc = archive(vec![spot("ACGT", vec![4], vec![BIO], vec![])], None);
  doc.tables.push(SeqTableDoc {
    name: "CONSENSUS".into(),
    first_row: 1,
    spots: vec![spot("TTTT", vec![4], vec![BIO], vec![])],
  });

  let (_, outputs) = run(&doc, OutputFormat::FastaWholeSpot, |_| {}).unwrap();
  assert_eq!(outputs["out.dat"], ">ACC.1\nTTTT\n");

  let (_, outputs) = run(&doc, OutputFormat::FastaWholeSpot, |cfg| {
    cfg.table = Some("SEQUENCE".into());
  })
  .unwrap();
  assert_eq!(outputs["out.dat"], ">ACC.1\nACGT\n");
}
