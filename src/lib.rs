//! # spiderq
//!
//! Per-spider request queues shared by crawler workers through a remote
//! key-value store.
//!
//! Provides FIFO, LIFO and priority disciplines ([`queue`]) over a small set of
//! store primitives ([`store`], with Redis and in-memory backends), the
//! request model and its codec boundary ([`model`], [`codec`]), request
//! fingerprints ([`fingerprint`]), and tracing/OpenTelemetry setup.

pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod model;
pub mod queue;
pub mod store;
pub mod telemetry;

pub use error::{Error, Result};
pub use model::{Request, RequestRecord, Spider, SpiderRef};
pub use queue::{QueueKind, RequestQueue, open_queue};
