use std::io::{Read, Write};

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Error;

lazy_static! {
  static ref TRAILING_SEGMENT_REGEX: Regex = Regex::new("([^/]*)$").unwrap();
}

/// The part of `value` after its last `/`, e.g. the status id at the end of
/// `https://twitter.com/someone/status/123`.
pub fn trailing_segment(value: &str) -> &str {
  TRAILING_SEGMENT_REGEX
    .captures(value)
    .and_then(|cap| cap.get(1))
    .map_or(value, |m| m.as_str())
}

/// Writes the trailing segment of the 1-based `column` of every data row of
/// a CSV file, one per line. The first row is a header and is skipped.
/// Returns the number of ids written.
pub fn extract_ids<R: Read, W: Write>(input: R, mut output: W, column: usize) -> Result<u64, Error> {
  if column == 0 {
    return Err(Error::InvalidColumn(column));
  }
  let mut rdr = csv::ReaderBuilder::new()
    .has_headers(true)
    .flexible(true)
    .from_reader(input);

  let mut written = 0;
  for (row, result) in rdr.records().enumerate() {
    let record = result?;
    let value = record.get(column - 1).ok_or(Error::MissingColumn {
      // header is row 1
      row: row as u64 + 2,
      column,
    })?;
    writeln!(output, "{}", trailing_segment(value))?;
    written += 1;
  }
  output.flush()?;
  Ok(written)
}
