//! Payload codecs.
//!
//! A codec turns a [`RequestRecord`] into the opaque bytes stored in the queue
//! and back. Implementations must be exact inverses of each other.

use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::RequestRecord;

/// Encode/decode pair used at the queue boundary.
pub trait Codec: Send + Sync {
    /// Short name used in errors and telemetry.
    fn name(&self) -> &'static str;

    fn encode(&self, record: &RequestRecord) -> Result<Vec<u8>>;

    fn decode(&self, payload: &[u8]) -> Result<RequestRecord>;
}

/// JSON payloads via serde_json. The default codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, record: &RequestRecord) -> Result<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| Error::Encode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, payload: &[u8]) -> Result<RequestRecord> {
        serde_json::from_slice(payload).map_err(|e| Error::Decode {
            codec: self.name(),
            reason: e.to_string(),
        })
    }
}

/// Codec selection as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    #[default]
    Json,
}

impl CodecKind {
    pub fn build(self) -> Arc<dyn Codec> {
        match self {
            CodecKind::Json => Arc::new(JsonCodec),
        }
    }
}

impl FromStr for CodecKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(CodecKind::Json),
            other => Err(Error::Config(format!("unknown codec: {other}"))),
        }
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecKind::Json => write!(f, "json"),
        }
    }
}
