//! First-in-first-out queue over a store list.

use std::time::Duration;

use super::{QueueBase, QueueKind, RequestQueue};
use crate::error::Result;
use crate::model::Request;

/// Pushes at the head, pops from the tail.
#[derive(Clone)]
pub struct FifoQueue {
    base: QueueBase,
}

impl FifoQueue {
    pub fn new(base: QueueBase) -> Self {
        Self { base }
    }
}

#[async_trait::async_trait]
impl RequestQueue for FifoQueue {
    fn kind(&self) -> QueueKind {
        QueueKind::Fifo
    }

    fn key(&self) -> &str {
        self.base.key()
    }

    async fn len(&self) -> Result<u64> {
        self.base.store().list_len(self.base.key()).await
    }

    async fn push(&self, request: &Request) -> Result<()> {
        let data = self.base.encode_request(request)?;
        self.base
            .store()
            .list_push_front(self.base.key(), &data)
            .await?;
        self.base.record(QueueKind::Fifo, "push");
        Ok(())
    }

    async fn pop(&self, _timeout: Duration) -> Result<Option<Request>> {
        let Some(data) = self.base.store().list_pop_back(self.base.key()).await? else {
            self.base.record(QueueKind::Fifo, "pop_empty");
            return Ok(None);
        };
        self.base.record(QueueKind::Fifo, "pop");
        self.base.decode_request(&data).map(Some)
    }

    async fn clear(&self) -> Result<()> {
        self.base.clear(QueueKind::Fifo).await
    }
}
