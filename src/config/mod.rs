//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup and fails fast on missing or malformed values.
//! The store URL is wrapped in `SecretString` so it never reaches the logs.

pub mod secrets;

use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;

use crate::codec::CodecKind;
use crate::error::{Error, Result};
use crate::fingerprint::FingerprintOptions;
use crate::queue::{DEFAULT_QUEUE_KEY, PAYLOAD_TABLE_KEY, QueueKind, QueueOptions};

#[derive(Debug)]
pub struct Config {
    pub store_url: SecretString,
    pub queue_kind: QueueKind,
    /// Key template with a `%(spider)s` placeholder.
    pub queue_key: String,
    pub payload_table: String,
    pub codec: CodecKind,
    /// Header names mixed into priority-queue fingerprints.
    pub fingerprint_headers: Vec<String>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let store_url = lookup("SPIDERQ_STORE_URL").ok_or_else(|| {
            Error::Config("required environment variable SPIDERQ_STORE_URL is not set".to_string())
        })?;

        Ok(Self {
            store_url: SecretString::from(store_url),
            queue_kind: parse_or_default(lookup("SPIDERQ_QUEUE_KIND"))?,
            queue_key: lookup("SPIDERQ_QUEUE_KEY").unwrap_or_else(|| DEFAULT_QUEUE_KEY.to_string()),
            payload_table: lookup("SPIDERQ_PAYLOAD_TABLE")
                .unwrap_or_else(|| PAYLOAD_TABLE_KEY.to_string()),
            codec: parse_or_default(lookup("SPIDERQ_CODEC"))?,
            fingerprint_headers: lookup("SPIDERQ_FINGERPRINT_HEADERS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            otel_endpoint: lookup("OTEL_ENDPOINT"),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("bad config file {}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            store_url: SecretString::from(file.store_url),
            queue_kind: parse_or_default(file.queue_kind)?,
            queue_key: file.queue_key,
            payload_table: file.payload_table,
            codec: parse_or_default(file.codec)?,
            fingerprint_headers: file.fingerprint_headers,
            otel_endpoint: file.otel_endpoint,
            log_level: file.log_level,
        })
    }

    /// Queue construction options derived from this configuration.
    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            key_template: self.queue_key.clone(),
            payload_table: self.payload_table.clone(),
            codec: self.codec.build(),
            fingerprint: FingerprintOptions {
                include_headers: self.fingerprint_headers.clone(),
                ..FingerprintOptions::default()
            },
        }
    }
}

fn parse_or_default<T>(value: Option<String>) -> Result<T>
where
    T: std::str::FromStr<Err = Error> + Default,
{
    value.map_or_else(|| Ok(T::default()), |v| v.parse())
}

/// Comma-separated names, blanks dropped.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// On-disk layout of the config file.
#[derive(Debug, Deserialize)]
struct FileConfig {
    store_url: String,
    #[serde(default)]
    queue_kind: Option<String>,
    #[serde(default = "default_queue_key")]
    queue_key: String,
    #[serde(default = "default_payload_table")]
    payload_table: String,
    #[serde(default)]
    codec: Option<String>,
    #[serde(default)]
    fingerprint_headers: Vec<String>,
    #[serde(default)]
    otel_endpoint: Option<String>,
    #[serde(default = "default_log_level")]
    log_level: String,
}

fn default_queue_key() -> String {
    DEFAULT_QUEUE_KEY.to_string()
}

fn default_payload_table() -> String {
    PAYLOAD_TABLE_KEY.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
