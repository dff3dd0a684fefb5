//! Batch rehydration of tweet ids.
//!
//! Ids are read one per line, grouped into chunks of at most
//! [`MAX_CHUNK_SIZE`] and sent to a [`Lookup`] one chunk at a time. Returned
//! records go to the output sink, ids the service did not return go to the
//! missing sink, and ids of chunks whose lookup failed go to the failed sink
//! so that they can be retried later.
use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use chrono::{Local, TimeZone, Utc};
use log::{debug, info, warn};
use serde_json::Value;

use crate::error::{Error, LookupError};
use crate::remote::Lookup;

/// Most ids the lookup endpoint accepts in one call.
pub const MAX_CHUNK_SIZE: usize = 100;
pub const DEFAULT_SLEEP_SECONDS: u64 = 1;
/// Length of a rate limit window, used when the server sends no reset time.
const RATE_LIMIT_WINDOW_SECS: i64 = 15 * 60;

pub trait Clock {
  /// Current unix time in seconds.
  fn now(&self) -> i64;
  fn sleep(&mut self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> i64 {
    Utc::now().timestamp()
  }

  fn sleep(&mut self, duration: Duration) {
    thread::sleep(duration);
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
  /// A single JSON array, one record per line.
  JsonArray,
  /// Newline-delimited JSON.
  JsonLines,
}

/// What the output sink already contains when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
  Fresh,
  /// An array left open by an earlier run.
  Continuation { has_records: bool },
}

#[derive(Debug, Clone)]
pub struct RunOptions {
  pub chunk_size: usize,
  pub sleep: Option<Duration>,
  pub restart_at: Option<u64>,
  /// `None` waits out rate limits for as long as it takes.
  pub max_rate_limit_waits: Option<u32>,
  pub format: OutputFormat,
}

impl Default for RunOptions {
  fn default() -> Self {
    RunOptions {
      chunk_size: MAX_CHUNK_SIZE,
      sleep: Some(Duration::from_secs(DEFAULT_SLEEP_SECONDS)),
      restart_at: None,
      max_rate_limit_waits: None,
      format: OutputFormat::JsonArray,
    }
  }
}

pub struct Sinks<W> {
  pub output: W,
  pub missing: W,
  pub failed: Option<W>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
  pub lines_processed: u64,
  pub chunks_processed: u64,
  pub rehydrated: u64,
  pub missing: u64,
  pub failed: u64,
  pub rate_limit_waits: u64,
}

/// Clamps a requested chunk size into `1..=MAX_CHUNK_SIZE`, falling back to
/// the maximum.
pub fn normalize_chunk_size(requested: i64) -> usize {
  if requested < 1 || requested > MAX_CHUNK_SIZE as i64 {
    warn!("Chunk size {} out of bounds, using {}", requested, MAX_CHUNK_SIZE);
    MAX_CHUNK_SIZE
  } else {
    requested as usize
  }
}

/// Seconds to sleep until the window resetting at `reset` is over.
pub fn rate_limit_wait(reset: i64, now: i64) -> Duration {
  Duration::from_secs((reset - now + 1).max(0) as u64)
}

/// The identifier of a returned record.
pub fn record_id(record: &Value) -> Option<String> {
  match record.get("id_str") {
    Some(Value::String(id)) => Some(id.clone()),
    _ => match record.get("id")? {
      Value::String(id) => Some(id.clone()),
      Value::Number(id) => Some(id.to_string()),
      _ => None,
    },
  }
}

/// Number of records carrying neither `id_str` nor `id`.
pub fn unidentified_records(records: &[Value]) -> usize {
  records.iter().filter(|record| record_id(record).is_none()).count()
}

/// Requested ids absent from `records`, in request order.
pub fn missing_ids<'a>(requested: &'a [String], records: &[Value]) -> Vec<&'a str> {
  let returned: HashSet<String> = records.iter().filter_map(record_id).collect();
  let mut seen = HashSet::new();
  requested
    .iter()
    .map(String::as_str)
    .filter(|id| !returned.contains(*id) && seen.insert(*id))
    .collect()
}

fn format_reset(reset: i64) -> String {
  Local
    .timestamp_opt(reset, 0)
    .single()
    .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
    .unwrap_or_else(|| reset.to_string())
}

pub struct Session<L, C, W> {
  lookup: L,
  clock: C,
  sinks: Sinks<W>,
  options: RunOptions,
  output_state: OutputState,
  first_record: bool,
  stats: Stats,
}

impl<L: Lookup, C: Clock, W: Write> Session<L, C, W> {
  pub fn new(lookup: L, clock: C, sinks: Sinks<W>, options: RunOptions, output_state: OutputState) -> Self {
    let first_record = match output_state {
      OutputState::Fresh => true,
      OutputState::Continuation { has_records } => !has_records,
    };
    Session {
      lookup,
      clock,
      sinks,
      options,
      output_state,
      first_record,
      stats: Stats::default(),
    }
  }

  pub fn stats(&self) -> Stats {
    self.stats
  }

  /// Rehydrates every id in `input`, honouring the restart line, and hands
  /// the sinks back once the output has been closed.
  pub fn run<R: BufRead>(mut self, input: R) -> Result<(Stats, Sinks<W>), Error> {
    self.open_output()?;
    let mut lines = input.lines();

    if let Some(restart_at) = self.options.restart_at {
      info!("Restarting processing at line {}", restart_at);
      let skip = restart_at.saturating_sub(1);
      while self.stats.lines_processed < skip {
        match lines.next() {
          Some(line) => {
            line?;
            self.stats.lines_processed += 1;
          }
          None => break,
        }
      }
    }

    let mut chunk = Vec::with_capacity(self.options.chunk_size);
    for line in lines {
      let line = line?;
      self.stats.lines_processed += 1;
      let id = line.trim();
      if id.is_empty() {
        continue;
      }
      chunk.push(id.to_string());
      if chunk.len() == self.options.chunk_size {
        self.process_chunk(&chunk)?;
        chunk.clear();
        info!("Processed {} lines", self.stats.lines_processed);
      }
    }
    if !chunk.is_empty() {
      self.process_chunk(&chunk)?;
    }

    self.close_output()?;
    info!(
      "Processed {} lines in {} chunks: {} rehydrated, {} missing, {} failed",
      self.stats.lines_processed,
      self.stats.chunks_processed,
      self.stats.rehydrated,
      self.stats.missing,
      self.stats.failed
    );
    Ok((self.stats, self.sinks))
  }

  /// Fetches one chunk, writing its records and missing ids. Returns the
  /// number of records written.
  pub fn fetch_chunk(&mut self, ids: &[String]) -> Result<usize, Error> {
    if ids.is_empty() {
      return Ok(0);
    }
    debug!("Processing chunk of {} tweets", ids.len());
    let records = self.lookup_waiting_out_rate_limits(ids)?;
    info!("Rehydrated {}/{} tweets", records.len(), ids.len());
    if let Some(remaining) = self.lookup.last_rate_limit().remaining {
      info!("Requests remaining in current window: {}", remaining);
    }

    let unidentified = unidentified_records(&records);
    if unidentified > 0 {
      warn!(
        "{} returned records carry no id, their requested ids will also be reported missing",
        unidentified
      );
    }
    let missing = missing_ids(ids, &records);
    for id in &missing {
      writeln!(self.sinks.missing, "Missing tweet for id: {}", id)?;
    }
    self.sinks.missing.flush()?;
    self.stats.missing += missing.len() as u64;

    for record in &records {
      self.write_record(record)?;
    }
    self.sinks.output.flush()?;
    self.stats.rehydrated += records.len() as u64;

    if let Some(delay) = self.options.sleep.filter(|delay| !delay.is_zero()) {
      debug!("Sleeping {}s", delay.as_secs_f64());
      self.clock.sleep(delay);
    }
    Ok(records.len())
  }

  fn lookup_waiting_out_rate_limits(&mut self, ids: &[String]) -> Result<Vec<Value>, Error> {
    let mut waits = 0;
    loop {
      match self.lookup.lookup(ids) {
        Ok(records) => return Ok(records),
        Err(LookupError::RateLimited) => {
          if self.options.max_rate_limit_waits.map_or(false, |max| waits >= max) {
            return Err(Error::RateLimitExhausted { waits });
          }
          waits += 1;
          self.stats.rate_limit_waits += 1;
          let now = self.clock.now();
          let reset = self
            .lookup
            .last_rate_limit()
            .reset
            .unwrap_or(now + RATE_LIMIT_WINDOW_SECS);
          let wait = rate_limit_wait(reset, now);
          info!(
            "Hit rate limit for current window (ending {}), sleep {:.2} minutes",
            format_reset(reset),
            wait.as_secs_f64() / 60.0
          );
          self.clock.sleep(wait);
        }
        Err(e) => return Err(e.into()),
      }
    }
  }

  /// Runs one chunk, recording it as failed when the lookup fails in a way
  /// the next chunk may not.
  fn process_chunk(&mut self, ids: &[String]) -> Result<(), Error> {
    self.stats.chunks_processed += 1;
    match self.fetch_chunk(ids) {
      Ok(_) => Ok(()),
      Err(Error::Lookup(e @ LookupError::Unauthorized { .. })) => {
        warn!("Auth Error: {}, skipping chunk of {} ids", e, ids.len());
        self.record_failed(ids)
      }
      Err(e) if e.is_chunk_recoverable() => {
        warn!("Error: {}, skipping chunk of {} ids", e, ids.len());
        self.record_failed(ids)
      }
      Err(e) => Err(e),
    }
  }

  fn record_failed(&mut self, ids: &[String]) -> Result<(), Error> {
    self.stats.failed += ids.len() as u64;
    match self.sinks.failed.as_mut() {
      Some(failed) => {
        for id in ids {
          writeln!(failed, "{}", id)?;
        }
        failed.flush()?;
      }
      None => warn!("Dropped ids {}", ids.join(",")),
    }
    Ok(())
  }

  fn write_record(&mut self, record: &Value) -> io::Result<()> {
    let out = &mut self.sinks.output;
    match self.options.format {
      OutputFormat::JsonArray => {
        if !self.first_record {
          out.write_all(b",\n")?;
        }
        serde_json::to_writer(&mut *out, record)?;
      }
      OutputFormat::JsonLines => {
        serde_json::to_writer(&mut *out, record)?;
        out.write_all(b"\n")?;
      }
    }
    self.first_record = false;
    Ok(())
  }

  fn open_output(&mut self) -> io::Result<()> {
    if self.options.format == OutputFormat::JsonArray && self.output_state == OutputState::Fresh {
      self.sinks.output.write_all(b"[\n")?;
    }
    self.sinks.output.flush()
  }

  fn close_output(&mut self) -> io::Result<()> {
    if self.options.format == OutputFormat::JsonArray {
      self.sinks.output.write_all(b"\n]\n")?;
    }
    self.sinks.output.flush()?;
    self.sinks.missing.flush()?;
    if let Some(failed) = self.sinks.failed.as_mut() {
      failed.flush()?;
    }
    Ok(())
  }
}
