//! Rehydrates a file of tweet ids into a JSON array of tweet objects.
//!
//! Due to the Twitter terms of service only tweet ids may be redistributed;
//! the tweets themselves have to be fetched back through the API, which
//! allows deleted or restricted tweets to disappear. Interrupted runs can be
//! picked up again with `--restart <line>`.
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::{error, info};

use rehydrate_util::config::Config;
use rehydrate_util::local::{open_append, open_append_or_stderr, open_id_file, open_output};
use rehydrate_util::rehydrate::{normalize_chunk_size, DEFAULT_SLEEP_SECONDS, MAX_CHUNK_SIZE};
use rehydrate_util::remote::{obtain_access_token, DEFAULT_API_BASE};
use rehydrate_util::{logger, Error, OutputFormat, RunOptions, Session, Sinks, SystemClock, TwitterClient};

#[derive(Parser)]
#[command(name = "rehydrate", about = "Rehydrate tweet ids using the Twitter API", version)]
struct Cli {
  /// Configuration file with a [twitter] section
  #[arg(short, long, value_name = "FILE")]
  config: PathBuf,

  /// File containing tweet ids to rehydrate, one per line
  #[arg(short = 'i', long = "id-file", value_name = "FILE")]
  id_file: PathBuf,

  /// File for tracking tweets that could not be retrieved (default: stderr)
  #[arg(short, long = "missing-file", value_name = "FILE")]
  missing_file: Option<PathBuf>,

  /// File collecting ids of chunks whose request failed, for a later retry
  #[arg(short, long = "failed-file", value_name = "FILE")]
  failed_file: Option<PathBuf>,

  /// Output file (default: stdout)
  #[arg(short, long = "output-file", value_name = "FILE")]
  output_file: Option<PathBuf>,

  /// Restart the rehydration at this line in the id file
  #[arg(short, long = "restart", value_name = "NUM")]
  restart: Option<u64>,

  /// Number of tweet ids to process in one API call (max 100)
  #[arg(short = 's', long = "chunk-size", value_name = "NUM", default_value_t = MAX_CHUNK_SIZE as i64, allow_negative_numbers = true)]
  chunk_size: i64,

  /// Number of seconds to sleep between API requests
  #[arg(short, long = "wait", value_name = "NUM", default_value_t = DEFAULT_SLEEP_SECONDS)]
  wait: u64,

  /// Give up on a chunk after this many rate limit waits (default: never)
  #[arg(long, value_name = "NUM")]
  max_rate_limit_waits: Option<u32>,

  #[arg(long, value_enum, default_value_t = Format::Json)]
  format: Format,

  /// API base URL
  #[arg(long, default_value = DEFAULT_API_BASE, hide = true)]
  api_base: String,

  #[arg(short, long)]
  verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
  /// One JSON array of tweets
  Json,
  /// One tweet per line
  Jsonl,
}

impl From<Format> for OutputFormat {
  fn from(format: Format) -> Self {
    match format {
      Format::Json => OutputFormat::JsonArray,
      Format::Jsonl => OutputFormat::JsonLines,
    }
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  logger::init(cli.verbose);
  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!("{}", e);
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<(), Error> {
  let input = open_id_file(&cli.id_file)?;
  let mut config = Config::load(&cli.config)?;
  let format = OutputFormat::from(cli.format);
  let options = RunOptions {
    chunk_size: normalize_chunk_size(cli.chunk_size),
    sleep: Some(Duration::from_secs(cli.wait)),
    restart_at: cli.restart,
    max_rate_limit_waits: cli.max_rate_limit_waits,
    format,
  };

  let output = open_output(cli.output_file.as_deref(), format, cli.restart)?;
  let missing = open_append_or_stderr(cli.missing_file.as_deref())?;
  let failed = match cli.failed_file.as_deref() {
    Some(path) => Some(Box::new(open_append(path)?) as Box<dyn std::io::Write>),
    None => None,
  };

  // only request a token if the config does not carry one yet
  let access_token = match config.access_token.clone() {
    Some(token) => token,
    None => {
      info!("Requesting access token");
      let token = obtain_access_token(&cli.api_base, &config.app_key, &config.app_secret)?;
      config.save_access_token(&token)?;
      token
    }
  };
  let client = TwitterClient::with_api_base(cli.api_base.as_str(), access_token)?;

  let sinks = Sinks {
    output: output.writer,
    missing,
    failed,
  };
  let session = Session::new(client, SystemClock, sinks, options, output.state);
  let (stats, _) = session.run(input)?;
  if stats.failed > 0 {
    info!("{} ids were not rehydrated because their request failed", stats.failed);
  }
  Ok(())
}
