use std::thread;
use std::time::Duration;

use log::{debug, warn};
use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, LookupError};

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";
const USER_AGENT: &str = "rehydrate-util (tweet id rehydration)";
const RATE_LIMIT_REMAINING_HEADER: &str = "x-rate-limit-remaining";
const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// Quota metadata reported alongside the most recent lookup response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimit {
  pub remaining: Option<u64>,
  /// Unix timestamp (seconds) at which the current window ends.
  pub reset: Option<i64>,
}

impl RateLimit {
  pub fn from_headers(headers: &HeaderMap) -> Self {
    let read = |name: &str| {
      headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
    };
    RateLimit {
      remaining: read(RATE_LIMIT_REMAINING_HEADER).and_then(|v| v.parse().ok()),
      // the header is an integer in practice, but tolerate "1700000000.0"
      reset: read(RATE_LIMIT_RESET_HEADER)
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v as i64),
    }
  }
}

/// A batch lookup endpoint for records keyed by identifier.
pub trait Lookup {
  /// Fetches the records for `ids`. Identifiers the service cannot resolve
  /// are simply absent from the result.
  fn lookup(&mut self, ids: &[String]) -> Result<Vec<Value>, LookupError>;

  /// Rate limit metadata from the most recent call.
  fn last_rate_limit(&self) -> RateLimit;
}

pub struct TwitterClient {
  client: Client,
  api_base: String,
  access_token: String,
  last_rate_limit: RateLimit,
}

impl TwitterClient {
  pub fn new(access_token: impl Into<String>) -> Result<Self, Error> {
    Self::with_api_base(DEFAULT_API_BASE, access_token)
  }

  pub fn with_api_base(
    api_base: impl Into<String>,
    access_token: impl Into<String>,
  ) -> Result<Self, Error> {
    Ok(TwitterClient {
      client: build_client()?,
      api_base: api_base.into().trim_end_matches('/').to_string(),
      access_token: access_token.into(),
      last_rate_limit: RateLimit::default(),
    })
  }

  pub fn lookup_url(&self) -> String {
    format!("{}/1.1/statuses/lookup.json", self.api_base)
  }

  fn send_lookup(&self, id_list: &str) -> Result<Response, LookupError> {
    let url = self.lookup_url();
    let mut last_error = None;
    for _retries in 0..3 {
      match self
        .client
        .get(&url)
        .bearer_auth(&self.access_token)
        .query(&[("id", id_list)])
        .send()
      {
        Ok(resp) => match resp.status().as_u16() {
          500 | 502 | 503 | 504 => {
            warn!("lookup returned HTTP {}, retrying in 10s", resp.status());
            last_error = Some(LookupError::Status {
              status: resp.status().as_u16(),
              body: resp.text().unwrap_or_default(),
            });
            thread::sleep(Duration::from_secs(10));
          }
          _ => return Ok(resp),
        },
        Err(e) => {
          warn!("lookup request failed ({}), retrying in 10s", e);
          last_error = Some(LookupError::Transport(e));
          thread::sleep(Duration::from_secs(10));
        }
      }
    }
    Err(last_error.unwrap_or(LookupError::Status {
      status: 0,
      body: String::from("no response"),
    }))
  }
}

impl Lookup for TwitterClient {
  fn lookup(&mut self, ids: &[String]) -> Result<Vec<Value>, LookupError> {
    let id_list = ids.join(",");
    let resp = self.send_lookup(&id_list)?;
    self.last_rate_limit = RateLimit::from_headers(resp.headers());
    let status = resp.status().as_u16();
    debug!("lookup of {} ids returned HTTP {}", ids.len(), status);
    match status {
      200 => {
        let payload = resp.text()?;
        Ok(parse_lookup_body(&payload)?)
      }
      429 => Err(LookupError::RateLimited),
      401 | 403 => Err(LookupError::Unauthorized {
        status,
        body: resp.text().unwrap_or_default(),
      }),
      _ => Err(LookupError::Status {
        status,
        body: resp.text().unwrap_or_default(),
      }),
    }
  }

  fn last_rate_limit(&self) -> RateLimit {
    self.last_rate_limit
  }
}

/// The lookup endpoint answers with a JSON array of records; anything else
/// is a decoding error.
pub fn parse_lookup_body(payload: &str) -> Result<Vec<Value>, serde_json::Error> {
  serde_json::from_str(payload)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  token_type: String,
  access_token: String,
}

/// Requests an application-only bearer token for the given app credentials.
pub fn obtain_access_token(api_base: &str, app_key: &str, app_secret: &str) -> Result<String, Error> {
  let client = build_client()?;
  let url = format!("{}/oauth2/token", api_base.trim_end_matches('/'));
  let resp = client
    .post(&url)
    .basic_auth(app_key, Some(app_secret))
    .form(&[("grant_type", "client_credentials")])
    .send()?;
  let status = resp.status();
  let payload = resp.text()?;
  if !status.is_success() {
    return Err(Error::Auth(format!("token request returned HTTP {}: {}", status, payload)));
  }
  parse_token_response(&payload)
}

fn parse_token_response(payload: &str) -> Result<String, Error> {
  let token: TokenResponse = serde_json::from_str(payload)?;
  if !token.token_type.eq_ignore_ascii_case("bearer") {
    return Err(Error::Auth(format!("unexpected token type '{}'", token.token_type)));
  }
  Ok(token.access_token)
}

fn build_client() -> Result<Client, Error> {
  Ok(
    reqwest::blocking::Client::builder()
      .user_agent(USER_AGENT)
      .timeout(Duration::from_secs(60))
      .build()?,
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::header::HeaderValue;

  #[test]
  fn rate_limit_reads_both_headers() {
    let mut headers = HeaderMap::new();
    headers.insert("x-rate-limit-remaining", HeaderValue::from_static("299"));
    headers.insert("x-rate-limit-reset", HeaderValue::from_static("1700000900"));
    let limit = RateLimit::from_headers(&headers);
    assert_eq!(limit.remaining, Some(299));
    assert_eq!(limit.reset, Some(1_700_000_900));
  }

  #[test]
  fn rate_limit_tolerates_missing_or_odd_headers() {
    let mut headers = HeaderMap::new();
    headers.insert("x-rate-limit-reset", HeaderValue::from_static("1700000900.0"));
    headers.insert("x-rate-limit-remaining", HeaderValue::from_static("lots"));
    let limit = RateLimit::from_headers(&headers);
    assert_eq!(limit.remaining, None);
    assert_eq!(limit.reset, Some(1_700_000_900));

    assert_eq!(RateLimit::from_headers(&HeaderMap::new()), RateLimit::default());
  }

  #[test]
  fn lookup_body_must_be_an_array() {
    let records = parse_lookup_body(r#"[{"id_str":"1"},{"id_str":"3"}]"#).unwrap();
    assert_eq!(records.len(), 2);
    assert!(parse_lookup_body(r#"{"errors":[]}"#).is_err());
  }

  #[test]
  fn token_response_requires_bearer() {
    let token = parse_token_response(r#"{"token_type":"bearer","access_token":"AAAA"}"#).unwrap();
    assert_eq!(token, "AAAA");
    assert!(matches!(
      parse_token_response(r#"{"token_type":"mac","access_token":"AAAA"}"#),
      Err(Error::Auth(_))
    ));
  }

  #[test]
  fn api_base_trailing_slash_is_ignored() {
    let client = TwitterClient::with_api_base("http://localhost:8080/", "token").unwrap();
    assert_eq!(client.lookup_url(), "http://localhost:8080/1.1/statuses/lookup.json");
  }

  #[test]
  fn default_client_targets_the_public_api() {
    let client = TwitterClient::new("token").unwrap();
    assert_eq!(client.lookup_url(), "https://api.twitter.com/1.1/statuses/lookup.json");
    assert_eq!(client.last_rate_limit(), RateLimit::default());
  }
}
