use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{what} '{}' not found", .path.display())]
  NotFound { what: &'static str, path: PathBuf },

  #[error("cannot read config file '{}': {source}", .path.display())]
  ConfigRead {
    path: PathBuf,
    #[source]
    source: ini::Error,
  },

  #[error("config file has no `{key}` in section [{section}]")]
  ConfigKey {
    section: &'static str,
    key: &'static str,
  },

  #[error("authentication failed: {0}")]
  Auth(String),

  #[error("still rate limited after {waits} waits, giving up on chunk")]
  RateLimitExhausted { waits: u32 },

  #[error("column numbers start at 1, got {0}")]
  InvalidColumn(usize),

  #[error("row {row} has no column {column}")]
  MissingColumn { row: u64, column: usize },

  #[error(transparent)]
  Lookup(#[from] LookupError),

  #[error(transparent)]
  Io(#[from] io::Error),

  #[error(transparent)]
  Http(#[from] reqwest::Error),

  #[error(transparent)]
  Json(#[from] serde_json::Error),

  #[error(transparent)]
  Csv(#[from] csv::Error),
}

/// Failure modes of a single lookup call.
#[derive(Debug, Error)]
pub enum LookupError {
  #[error("rate limit exceeded")]
  RateLimited,

  #[error("lookup rejected with HTTP {status}: {body}")]
  Unauthorized { status: u16, body: String },

  #[error("lookup returned HTTP {status}: {body}")]
  Status { status: u16, body: String },

  #[error("lookup request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("malformed lookup response: {0}")]
  Decode(#[from] serde_json::Error),
}

impl Error {
  /// Whether the run can drop the current chunk and carry on.
  pub fn is_chunk_recoverable(&self) -> bool {
    match self {
      Error::Lookup(_) | Error::RateLimitExhausted { .. } => true,
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lookup_failures_are_recoverable_but_io_is_not() {
    let unauthorized = Error::Lookup(LookupError::Unauthorized {
      status: 401,
      body: String::new(),
    });
    assert!(unauthorized.is_chunk_recoverable());

    let server = Error::Lookup(LookupError::Status {
      status: 500,
      body: "oops".into(),
    });
    assert!(server.is_chunk_recoverable());
    assert!(Error::RateLimitExhausted { waits: 3 }.is_chunk_recoverable());

    let io = Error::Io(io::Error::new(io::ErrorKind::Other, "disk full"));
    assert!(!io.is_chunk_recoverable());
  }

  #[test]
  fn not_found_names_the_file() {
    let err = Error::NotFound {
      what: "Tweet ID file",
      path: PathBuf::from("ids.txt"),
    };
    assert_eq!(err.to_string(), "Tweet ID file 'ids.txt' not found");
  }
}
