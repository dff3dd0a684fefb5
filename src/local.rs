use std::fs::File;
use std::io::{self, prelude::*, BufReader, BufWriter, SeekFrom};
use std::path::Path;

use log::{info, warn};

use crate::error::Error;
use crate::rehydrate::{OutputFormat, OutputState};

/// How much of an existing output file is inspected when resuming.
const TAIL_WINDOW: u64 = 4096;

pub struct OutputTarget {
  pub writer: Box<dyn Write>,
  pub state: OutputState,
}

pub fn open_id_file(path: &Path) -> Result<BufReader<File>, Error> {
  if !path.is_file() {
    return Err(Error::NotFound {
      what: "Tweet ID file",
      path: path.to_path_buf(),
    });
  }
  Ok(BufReader::new(File::open(path)?))
}

/// Opens the output sink, defaulting to stdout. An existing file is only
/// continued when restarting past the first line; otherwise a new array is
/// started at its end.
pub fn open_output(
  path: Option<&Path>,
  format: OutputFormat,
  restart_at: Option<u64>,
) -> Result<OutputTarget, Error> {
  let path = match path {
    Some(path) => path,
    None => {
      return Ok(OutputTarget {
        writer: Box::new(io::stdout()),
        state: OutputState::Fresh,
      })
    }
  };
  let restarting = restart_at.map_or(false, |line| line > 1);
  let existing_len = if path.exists() { path.metadata()?.len() } else { 0 };

  let mut file = File::options().read(true).append(true).create(true).open(path)?;
  let state = if existing_len == 0 {
    if restarting {
      warn!("Restarting without an existing output file, starting a new one");
    }
    OutputState::Fresh
  } else if restarting {
    match format {
      OutputFormat::JsonArray => prepare_array_continuation(&mut file)?,
      OutputFormat::JsonLines => OutputState::Continuation { has_records: true },
    }
  } else {
    if format == OutputFormat::JsonArray {
      warn!(
        "Output file '{}' already exists and --restart was not given, appending a new array to it",
        path.display()
      );
    }
    OutputState::Fresh
  };
  Ok(OutputTarget {
    writer: Box::new(BufWriter::new(file)),
    state,
  })
}

/// Opens a file for appending, or falls back to stderr.
pub fn open_append_or_stderr(path: Option<&Path>) -> Result<Box<dyn Write>, Error> {
  Ok(match path {
    Some(path) => Box::new(open_append(path)?),
    None => Box::new(io::stderr()),
  })
}

pub fn open_append(path: &Path) -> Result<File, Error> {
  Ok(File::options().append(true).create(true).open(path)?)
}

/// Strips a closing bracket left by a completed run so the array can be
/// continued, and reports whether it already holds any record.
fn prepare_array_continuation(file: &mut File) -> Result<OutputState, Error> {
  let len = file.metadata()?.len();
  let window = len.min(TAIL_WINDOW);
  file.seek(SeekFrom::Start(len - window))?;
  let mut tail = Vec::with_capacity(window as usize);
  file.read_to_end(&mut tail)?;

  let mut end = trimmed_end(&tail);
  if end > 0 && tail[end - 1] == b']' {
    end = trimmed_end(&tail[..end - 1]);
    let keep = len - window + end as u64;
    info!("Removing closing bracket of the previous run");
    file.set_len(keep)?;
  }
  let has_records = !(end > 0 && tail[end - 1] == b'[');
  Ok(OutputState::Continuation { has_records })
}

fn trimmed_end(bytes: &[u8]) -> usize {
  bytes
    .iter()
    .rposition(|b| !b.is_ascii_whitespace())
    .map_or(0, |pos| pos + 1)
}
