//! Credentials for the lookup API, read from an INI file:
//!
//! ```ini
//! [twitter]
//! app_key = XXXXXXXXXX
//! app_secret = XXXXXXXXXX
//! # If access_token is not present one is requested and saved here.
//! access_token = XXXXXXXXXX
//! ```
use std::path::{Path, PathBuf};

use ini::Ini;
use log::info;

use crate::error::Error;

const SECTION: &str = "twitter";

#[derive(Debug)]
pub struct Config {
  path: PathBuf,
  ini: Ini,
  pub app_key: String,
  pub app_secret: String,
  pub access_token: Option<String>,
}

impl Config {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
    let path = path.as_ref();
    if !path.is_file() {
      return Err(Error::NotFound {
        what: "config file",
        path: path.to_path_buf(),
      });
    }
    let ini = Ini::load_from_file(path).map_err(|source| Error::ConfigRead {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_ini(path.to_path_buf(), ini)
  }

  fn from_ini(path: PathBuf, ini: Ini) -> Result<Self, Error> {
    let get = |key: &'static str| {
      ini
        .section(Some(SECTION))
        .and_then(|section| section.get(key))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
    };
    let app_key = get("app_key").ok_or(Error::ConfigKey {
      section: SECTION,
      key: "app_key",
    })?;
    let app_secret = get("app_secret").ok_or(Error::ConfigKey {
      section: SECTION,
      key: "app_secret",
    })?;
    let access_token = get("access_token");
    Ok(Config {
      path,
      ini,
      app_key,
      app_secret,
      access_token,
    })
  }

  /// Stores `token` and rewrites the config file with it.
  pub fn save_access_token(&mut self, token: &str) -> Result<(), Error> {
    info!("Saving access token to config file '{}'", self.path.display());
    self
      .ini
      .with_section(Some(SECTION))
      .set("access_token", token);
    self.ini.write_to_file(&self.path)?;
    self.access_token = Some(token.to_string());
    Ok(())
  }
}
