pub mod config;
pub mod error;
pub mod extract;
pub mod local;
pub mod logger;
pub mod rehydrate;
pub mod remote;

pub use error::{Error, LookupError};
pub use rehydrate::{OutputFormat, OutputState, RunOptions, Session, Sinks, Stats, SystemClock};
pub use remote::{Lookup, RateLimit, TwitterClient};
