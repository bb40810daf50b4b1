//! Last-in-first-out queue over a store list.

use std::time::Duration;

use super::{QueueBase, QueueKind, RequestQueue};
use crate::error::Result;
use crate::model::Request;

/// Pushes and pops at the head.
#[derive(Clone)]
pub struct LifoQueue {
    base: QueueBase,
}

impl LifoQueue {
    pub fn new(base: QueueBase) -> Self {
        Self { base }
    }
}

#[async_trait::async_trait]
impl RequestQueue for LifoQueue {
    fn kind(&self) -> QueueKind {
        QueueKind::Lifo
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
        self.base.record(QueueKind::Lifo, "push");
        Ok(())
    }

    async fn pop(&self, _timeout: Duration) -> Result<Option<Request>> {
        let Some(data) = self.base.store().list_pop_front(self.base.key()).await? else {
            self.base.record(QueueKind::Lifo, "pop_empty");
            return Ok(None);
        };
        self.base.record(QueueKind::Lifo, "pop");
        self.base.decode_request(&data).map(Some)
    }

    async fn clear(&self) -> Result<()> {
        self.base.clear(QueueKind::Lifo).await
    }
}
