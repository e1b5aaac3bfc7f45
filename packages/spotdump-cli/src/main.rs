mod cli;

use clap::Parser;
use cli::{SpotdumpArgs, build_config};
use log::LevelFilter;
use spotdump::pipeline::{self, RunSummary};
use std::process::ExitCode;

fn main() -> ExitCode {
  if let Err(err) = color_eyre::install() {
    eprintln!("failed to install error reporting: {err}");
    return ExitCode::FAILURE;
  }

  let args = SpotdumpArgs::parse();
  setup_logger(args.verbose);

  match try_run(&args) {
    Ok(summary) => {
      if !args.stdout {
        print_stats(&summary);
      }
      ExitCode::SUCCESS
    }
    Err(err) => {
      let code = err.exit_code() as u8;
      let report = eyre::Report::new(err)
        .wrap_err(format!("When processing '{}'", args.accession.display()));
      log::error!("{report:#}");
      ExitCode::from(code)
    }
  }
}

fn try_run(args: &SpotdumpArgs) -> spotdump::Result<RunSummary> {
  let cfg = build_config(args)?;
  pipeline::run(&cfg)
}

fn setup_logger(verbosity: u8) {
  let level = match verbosity {
    0 => LevelFilter::Warn,
    1 => LevelFilter::Info,
    2 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  };
  env_logger::Builder::from_env(
    env_logger::Env::default().default_filter_or(level.to_string()),
  )
  .format_timestamp(None)
  .init();
}

fn print_stats(summary: &RunSummary) {
  let stats = &summary.stats;
  println!("spots read      : {}", stats.spots_read);
  println!("reads read      : {}", stats.reads_read);
  println!("reads written   : {}", stats.reads_written);
  if stats.reads_zero_length > 0 {
    println!("reads 0-length  : {}", stats.reads_zero_length);
  }
  if stats.reads_technical > 0 {
    println!("technical reads : {}", stats.reads_technical);
  }
  if stats.reads_too_short > 0 {
    println!("reads too short : {}", stats.reads_too_short);
  }
  if stats.reads_invalid > 0 {
    println!("reads invalid   : {}", stats.reads_invalid);
  }
  for output in &summary.outputs {
    log::info!("output: '{}'", output.display());
  }
}
