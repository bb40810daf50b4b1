//! Error types for spiderq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad configuration: unknown queue kind or codec, missing variable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A store primitive failed on a backend without its own error type.
    #[error("store error: {0}")]
    Store(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("{codec} codec failed to encode request: {reason}")]
    Encode { codec: &'static str, reason: String },

    /// The payload was already removed from the queue when this is raised.
    #[error("{codec} codec failed to decode payload: {reason}")]
    Decode { codec: &'static str, reason: String },

    /// An index entry was popped but the payload table had nothing for it.
    #[error("no payload stored for fingerprint {fingerprint}")]
    MissingPayload { fingerprint: String },

    #[error("spider {spider} has no callback named {callback}")]
    UnknownCallback { spider: String, callback: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
