use std::collections::HashSet;
use std::fs;
use std::io::{BufReader, Write};
use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::tempdir;

use rehydrate_util::local::{open_append, open_output};
use rehydrate_util::rehydrate::{record_id, Clock};
use rehydrate_util::{Lookup, LookupError, OutputFormat, OutputState, RateLimit, RunOptions, Session, Sinks};

/// Serves every id except those listed as deleted.
struct Service {
  deleted: HashSet<&'static str>,
}

impl Lookup for Service {
  fn lookup(&mut self, ids: &[String]) -> Result<Vec<Value>, LookupError> {
    Ok(
      ids
        .iter()
        .filter(|id| !self.deleted.contains(id.as_str()))
        .map(|id| json!({ "id_str": id, "user": { "screen_name": "someone" } }))
        .collect(),
    )
  }

  fn last_rate_limit(&self) -> RateLimit {
    RateLimit {
      remaining: Some(299),
      reset: None,
    }
  }
}

struct NoSleep;

impl Clock for NoSleep {
  fn now(&self) -> i64 {
    0
  }

  fn sleep(&mut self, _duration: Duration) {}
}

fn run_once(dir: &Path, ids: &str, restart_at: Option<u64>) {
  let id_path = dir.join("ids.txt");
  let out_path = dir.join("tweets.json");
  let missing_path = dir.join("missing.txt");
  fs::write(&id_path, ids).unwrap();

  let output = open_output(Some(&out_path), OutputFormat::JsonArray, restart_at).unwrap();
  let missing: Box<dyn Write> = Box::new(open_append(&missing_path).unwrap());
  let sinks = Sinks {
    output: output.writer,
    missing,
    failed: None,
  };
  let options = RunOptions {
    chunk_size: 2,
    sleep: None,
    restart_at,
    ..RunOptions::default()
  };
  let service = Service {
    deleted: ["4"].into_iter().collect(),
  };
  let input = BufReader::new(fs::File::open(&id_path).unwrap());
  Session::new(service, NoSleep, sinks, options, output.state)
    .run(input)
    .unwrap();
}

fn written_ids(path: &Path) -> Vec<String> {
  let tweets: Vec<Value> = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
  tweets.iter().filter_map(record_id).collect()
}

#[test]
fn full_run_writes_a_json_array_and_missing_ids() {
  let dir = tempdir().unwrap();
  run_once(dir.path(), "1\n2\n3\n4\n5\n", None);

  assert_eq!(written_ids(&dir.path().join("tweets.json")), vec!["1", "2", "3", "5"]);
  assert_eq!(
    fs::read_to_string(dir.path().join("missing.txt")).unwrap(),
    "Missing tweet for id: 4\n"
  );
}

#[test]
fn restarted_run_extends_the_same_array() {
  let dir = tempdir().unwrap();
  // first run only got through the first three lines
  run_once(dir.path(), "1\n2\n3\n", None);
  run_once(dir.path(), "1\n2\n3\n4\n5\n6\n", Some(4));

  assert_eq!(
    written_ids(&dir.path().join("tweets.json")),
    vec!["1", "2", "3", "5", "6"]
  );
  assert_eq!(
    fs::read_to_string(dir.path().join("missing.txt")).unwrap(),
    "Missing tweet for id: 4\n"
  );
}

#[test]
fn interrupted_output_is_completed_by_a_restart() {
  let dir = tempdir().unwrap();
  let out_path = dir.path().join("tweets.json");
  // killed after writing two tweets, no closing bracket
  fs::write(&out_path, "[\n{\"id_str\":\"1\"},\n{\"id_str\":\"2\"}").unwrap();
  run_once(dir.path(), "1\n2\n3\n", Some(3));

  assert_eq!(written_ids(&out_path), vec!["1", "2", "3"]);
  assert_eq!(
    open_output(Some(&out_path), OutputFormat::JsonArray, Some(2)).unwrap().state,
    OutputState::Continuation { has_records: true }
  );
}
