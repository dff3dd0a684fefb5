use std::io::Write;

use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;

/// Logs to stderr as `2024-01-01 12:00:00 [INFO] - message`. `RUST_LOG`
/// overrides the level.
pub fn init(verbose: bool) {
  let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
  Builder::new()
    .format(|buf, record| {
      writeln!(
        buf,
        "{} [{}] - {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        record.level(),
        record.args()
      )
    })
    .filter(None, level)
    .parse_default_env()
    .init();
}
