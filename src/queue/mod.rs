//! Per-spider request queues over a shared [`Store`].
//!
//! A queue is a stateless view: store handle, resolved key and codec. Workers
//! in different processes that open the same kind of queue for the same
//! spider see one logical queue. Three disciplines share the
//! [`RequestQueue`] interface and are picked with [`QueueKind`].

mod fifo;
mod lifo;
mod priority;

pub use fifo::FifoQueue;
pub use lifo::LifoQueue;
pub use priority::PriorityQueue;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;

use crate::codec::{Codec, JsonCodec};
use crate::error::{Error, Result};
use crate::fingerprint::FingerprintOptions;
use crate::model::{Request, Spider};
use crate::store::Store;
use crate::telemetry::metrics;

/// Key template placeholder replaced by the spider name.
pub const SPIDER_PLACEHOLDER: &str = "%(spider)s";

/// Default per-spider queue key.
pub const DEFAULT_QUEUE_KEY: &str = "%(spider)s:requests";

/// Hash shared by every priority queue, mapping fingerprint to payload.
pub const PAYLOAD_TABLE_KEY: &str = "blog_crawler:request_bodies";

/// Substitute the spider name into a key template.
pub fn resolve_key(template: &str, spider: &str) -> String {
    template.replace(SPIDER_PLACEHOLDER, spider)
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Delivery discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueKind {
    /// First in, first out.
    Fifo,
    /// Last in, first out.
    Lifo,
    /// Highest priority first.
    #[default]
    Priority,
}

impl QueueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueKind::Fifo => "fifo",
            QueueKind::Lifo => "lifo",
            QueueKind::Priority => "priority",
        }
    }
}

impl FromStr for QueueKind {
    type Err = Error;

    /// Accepts the short names plus the legacy class names crawler settings
    /// still carry (`SpiderQueue`, `SpiderStack`, `SpiderPriorityQueue`).
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().rsplit('.').next().unwrap_or_default();
        match name.to_ascii_lowercase().as_str() {
            "fifo" | "fifoqueue" | "spiderqueue" => Ok(QueueKind::Fifo),
            "lifo" | "lifoqueue" | "spiderstack" => Ok(QueueKind::Lifo),
            "priority" | "priorityqueue" | "spiderpriorityqueue" => Ok(QueueKind::Priority),
            _ => Err(Error::Config(format!("unknown queue kind: {s}"))),
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

/// Operations every discipline supports.
///
/// `pop` takes a timeout for API compatibility only. No discipline blocks:
/// an empty queue yields `None` at once and callers poll.
#[async_trait::async_trait]
pub trait RequestQueue: Send + Sync {
    fn kind(&self) -> QueueKind;

    /// Resolved store key.
    fn key(&self) -> &str;

    /// Number of queued requests.
    async fn len(&self) -> Result<u64>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Encode and enqueue. Store errors propagate; nothing is retried.
    async fn push(&self, request: &Request) -> Result<()>;

    /// Remove and decode one request, or `None` when empty.
    async fn pop(&self, timeout: Duration) -> Result<Option<Request>>;

    /// Delete this queue's structure. Idempotent.
    async fn clear(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Base
// ---------------------------------------------------------------------------

/// State shared by all disciplines, and the encode/decode boundary.
#[derive(Clone)]
pub struct QueueBase {
    store: Arc<dyn Store>,
    spider: Arc<dyn Spider>,
    key: String,
    codec: Arc<dyn Codec>,
}

impl QueueBase {
    /// Resolve `key_template` for `spider`. A missing codec means JSON.
    pub fn new(
        store: Arc<dyn Store>,
        spider: Arc<dyn Spider>,
        key_template: &str,
        codec: Option<Arc<dyn Codec>>,
    ) -> Self {
        let key = resolve_key(key_template, spider.name());
        Self {
            store,
            spider,
            key,
            codec: codec.unwrap_or_else(|| Arc::new(JsonCodec)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn spider(&self) -> &dyn Spider {
        self.spider.as_ref()
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn encode_request(&self, request: &Request) -> Result<Vec<u8>> {
        let record = request.to_record(self.spider())?;
        self.codec.encode(&record)
    }

    pub fn decode_request(&self, payload: &[u8]) -> Result<Request> {
        let record = self.codec.decode(payload)?;
        Request::from_record(record, self.spider())
    }

    /// Delete the queue's own structure. Never touches the payload table.
    pub async fn clear(&self, kind: QueueKind) -> Result<()> {
        self.store.clear(&self.key).await?;
        self.record(kind, "clear");
        Ok(())
    }

    /// Count one finished operation and log it.
    pub(crate) fn record(&self, kind: QueueKind, operation: &'static str) {
        tracing::debug!(queue.kind = %kind, queue.key = %self.key, operation, "queue operation");
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("kind", kind.as_str()),
                KeyValue::new("operation", operation),
            ],
        );
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Everything besides store and spider needed to open a queue.
#[derive(Clone)]
pub struct QueueOptions {
    pub key_template: String,
    pub payload_table: String,
    pub codec: Arc<dyn Codec>,
    /// Only the priority queue fingerprints requests.
    pub fingerprint: FingerprintOptions,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            key_template: DEFAULT_QUEUE_KEY.to_string(),
            payload_table: PAYLOAD_TABLE_KEY.to_string(),
            codec: Arc::new(JsonCodec),
            fingerprint: FingerprintOptions::default(),
        }
    }
}

/// Open a queue of the given kind for `spider`.
pub fn open_queue(
    kind: QueueKind,
    store: Arc<dyn Store>,
    spider: Arc<dyn Spider>,
    options: &QueueOptions,
) -> Box<dyn RequestQueue> {
    let base = QueueBase::new(
        store,
        spider,
        &options.key_template,
        Some(Arc::clone(&options.codec)),
    );
    match kind {
        QueueKind::Fifo => Box::new(FifoQueue::new(base)),
        QueueKind::Lifo => Box::new(LifoQueue::new(base)),
        QueueKind::Priority => Box::new(
            PriorityQueue::new(base, &options.payload_table)
                .with_fingerprint_options(options.fingerprint.clone()),
        ),
    }
}
