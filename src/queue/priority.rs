//! Priority queue over a sorted-set index and the shared payload table.
//!
//! The index holds fingerprints scored by negated priority, so the lowest
//! score is the most urgent request. Payloads live in one hash shared by every
//! priority queue of every spider, keyed by fingerprint.
//!
//! Push writes the payload before the index entry; pop removes the index
//! entry before reading and deleting the payload. Stores that can run both
//! steps as one unit do so (see [`Store::index_payload`]); otherwise a worker
//! dying between steps can leave an unreferenced payload behind, or lose the
//! request it had just taken off the index.
//!
//! Requests with equal fingerprints collapse: the sorted set holds one member
//! and the table one payload, the last one pushed. The same happens across
//! queues, since the table is shared. A queue whose entry was consumed through
//! another queue finds no payload and reports [`Error::MissingPayload`].
//!
//! [`Store::index_payload`]: crate::store::Store::index_payload

use std::time::Duration;

use opentelemetry::KeyValue;

use super::{QueueBase, QueueKind, RequestQueue};
use crate::error::{Error, Result};
use crate::fingerprint::{FingerprintOptions, fingerprint_with};
use crate::model::Request;
use crate::telemetry::metrics;

#[derive(Clone)]
pub struct PriorityQueue {
    base: QueueBase,
    payload_table: String,
    fingerprint: FingerprintOptions,
}

impl PriorityQueue {
    pub fn new(base: QueueBase, payload_table: impl Into<String>) -> Self {
        Self {
            base,
            payload_table: payload_table.into(),
            fingerprint: FingerprintOptions::default(),
        }
    }

    /// Fingerprint with extra headers or kept fragments.
    pub fn with_fingerprint_options(mut self, options: FingerprintOptions) -> Self {
        self.fingerprint = options;
        self
    }

    pub fn payload_table(&self) -> &str {
        &self.payload_table
    }
}

/// Index score for a priority: higher priority sorts first.
fn score_for(priority: i32) -> i64 {
    -i64::from(priority)
}

#[async_trait::async_trait]
impl RequestQueue for PriorityQueue {
    fn kind(&self) -> QueueKind {
        QueueKind::Priority
    }

    fn key(&self) -> &str {
        self.base.key()
    }

    /// Index size. The payload table is shared and may differ.
    async fn len(&self) -> Result<u64> {
        self.base.store().zset_len(self.base.key()).await
    }

    async fn push(&self, request: &Request) -> Result<()> {
        let data = self.base.encode_request(request)?;
        let fingerprint = fingerprint_with(request, &self.fingerprint);

        self.base
            .store()
            .index_payload(
                self.base.key(),
                &self.payload_table,
                &fingerprint,
                score_for(request.priority),
                &data,
            )
            .await?;

        tracing::trace!(%fingerprint, priority = request.priority, "indexed request");
        self.base.record(QueueKind::Priority, "push");
        Ok(())
    }

    async fn pop(&self, _timeout: Duration) -> Result<Option<Request>> {
        let Some(taken) = self
            .base
            .store()
            .take_min_payload(self.base.key(), &self.payload_table)
            .await?
        else {
            self.base.record(QueueKind::Priority, "pop_empty");
            return Ok(None);
        };

        let Some(data) = taken.payload else {
            metrics::payload_missing().add(1, &[KeyValue::new("queue", self.base.key().to_string())]);
            return Err(Error::MissingPayload {
                fingerprint: taken.member,
            });
        };

        self.base.record(QueueKind::Priority, "pop");
        self.base.decode_request(&data).map(Some)
    }

    async fn clear(&self) -> Result<()> {
        self.base.clear(QueueKind::Priority).await
    }
}
