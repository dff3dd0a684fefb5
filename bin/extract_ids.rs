//! Extracts tweet ids from one column of a CSV file, e.g. a column of tweet
//! URLs, writing one id per line.
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use rehydrate_util::extract::extract_ids;
use rehydrate_util::{logger, Error};

#[derive(Parser)]
#[command(name = "extract_ids", about = "Extract tweet ids from a CSV column", version)]
struct Cli {
  /// CSV file containing tweet ids or URLs, with a header row
  #[arg(short, long = "input-file", value_name = "FILE")]
  input_file: PathBuf,

  /// Output file (default: stdout)
  #[arg(short, long = "output-file", value_name = "FILE")]
  output_file: Option<PathBuf>,

  /// 1-based column number to look for ids
  #[arg(short, long = "field-num", value_name = "NUM")]
  field_num: usize,
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  logger::init(false);
  match run(cli) {
    Ok(count) => {
      info!("Extracted {} ids", count);
      ExitCode::SUCCESS
    }
    Err(e) => {
      error!("{}", e);
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<u64, Error> {
  if !cli.input_file.is_file() {
    return Err(Error::NotFound {
      what: "Input file",
      path: cli.input_file,
    });
  }
  let input = File::open(&cli.input_file)?;
  let output: Box<dyn Write> = match cli.output_file {
    Some(path) => Box::new(BufWriter::new(File::create(path)?)),
    None => Box::new(io::stdout().lock()),
  };
  extract_ids(input, output, cli.field_num)
}
