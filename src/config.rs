//! Search cluster connection settings
//!
//! Settings come from the environment, usually sourced from a dotenv file:
//!
//! - `SEARCH_URL`: cluster base URL (required)
//! - `SEARCH_APIKEY`: API key (optional, wins over username/password)
//! - `SEARCH_USERNAME` / `SEARCH_PASSWORD`: basic auth (optional)
//! - `SEARCH_SCROLL_KEEP_ALIVE`: scroll context lifetime, default `1m`
//! - `SEARCH_BATCH_SIZE`: hits per scroll response, default `100`
//! - `SEARCH_TIMEOUT`: HTTP request timeout, default `30s`
//!
//! The same settings can be kept in a YAML file:
//! ```yaml
//! url: http://localhost:9200
//! username: elastic
//! password: changeme
//! keep_alive: 1m
//! batch_size: 500
//! timeout: 30s
//! ```

use crate::client::{Auth, HttpSearchClient, KeepAlive, format_duration, parse_duration};
use crate::iter::DEFAULT_BATCH_SIZE;
use eyre::{Result, WrapErr, bail};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const SEARCH_URL: &str = "SEARCH_URL";
pub const SEARCH_APIKEY: &str = "SEARCH_APIKEY";
pub const SEARCH_USERNAME: &str = "SEARCH_USERNAME";
pub const SEARCH_PASSWORD: &str = "SEARCH_PASSWORD";
pub const SEARCH_SCROLL_KEEP_ALIVE: &str = "SEARCH_SCROLL_KEEP_ALIVE";
pub const SEARCH_BATCH_SIZE: &str = "SEARCH_BATCH_SIZE";
pub const SEARCH_TIMEOUT: &str = "SEARCH_TIMEOUT";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apikey: Option<String>,
    #[serde(default)]
    pub keep_alive: KeepAlive,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(
        default = "default_timeout",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn serialize_duration<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(*duration))
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Source a dotenv file into the environment, if it exists
///
/// Variables already set in the environment are kept.
pub fn load_dotenv(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    if !path.exists() {
        log::debug!("No dotenv file at {}", path.display());
        return Ok(false);
    }
    dotenvy::from_path(path)
        .wrap_err_with(|| format!("Failed to load dotenv file: {}", path.display()))?;
    log::debug!("Loaded environment from {}", path.display());
    Ok(true)
}

impl SearchConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            apikey: None,
            keep_alive: KeepAlive::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Load settings from the `SEARCH_*` environment variables
    ///
    /// # Errors
    /// Returns an error if `SEARCH_URL` is missing or invalid, or an optional
    /// variable cannot be parsed
    pub fn from_env() -> Result<Self> {
        let url = env(SEARCH_URL).ok_or_else(|| {
            eyre::eyre!("{} environment variable not set", SEARCH_URL)
        })?;
        let mut config = Self::new(url);
        config.username = env(SEARCH_USERNAME);
        config.password = env(SEARCH_PASSWORD);
        config.apikey = env(SEARCH_APIKEY);
        if let Some(keep_alive) = env(SEARCH_SCROLL_KEEP_ALIVE) {
            config.keep_alive = keep_alive
                .parse()
                .wrap_err_with(|| format!("Invalid {}", SEARCH_SCROLL_KEEP_ALIVE))?;
        }
        if let Some(batch_size) = env(SEARCH_BATCH_SIZE) {
            config.batch_size = batch_size
                .trim()
                .parse()
                .wrap_err_with(|| format!("Invalid {}: {}", SEARCH_BATCH_SIZE, batch_size))?;
        }
        if let Some(timeout) = env(SEARCH_TIMEOUT) {
            config.timeout =
                parse_duration(&timeout).wrap_err_with(|| format!("Invalid {}", SEARCH_TIMEOUT))?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Read settings from a YAML file
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse config YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write settings to a YAML file
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).wrap_err("Failed to serialize config")?;
        std::fs::write(path, yaml)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.parsed_url()?;
        if self.batch_size == 0 {
            bail!("Batch size must be at least 1");
        }
        if self.username.is_some() != self.password.is_some() && self.apikey.is_none() {
            log::warn!(
                "Only one of {} and {} is set, connecting without authentication",
                SEARCH_USERNAME,
                SEARCH_PASSWORD
            );
        }
        Ok(())
    }

    pub fn parsed_url(&self) -> Result<Url> {
        Url::parse(&self.url).wrap_err_with(|| format!("Invalid {}: {}", SEARCH_URL, self.url))
    }

    pub fn auth(&self) -> Auth {
        Auth::detect(
            self.username.clone(),
            self.password.clone(),
            self.apikey.clone(),
        )
    }

    /// Build an HTTP client for the configured cluster
    pub fn client(&self) -> Result<HttpSearchClient> {
        HttpSearchClient::try_new(self.parsed_url()?, self.auth(), self.timeout)
            .wrap_err("Failed to create search client")
    }
}
