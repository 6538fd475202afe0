//! Persistence collaborator.
//!
//! Inbound messages are stored by numeric ID on a best-effort basis before
//! dispatch. The core never reads them back; replay tooling does, through
//! [`MessageStore::load`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreResult;
use crate::message::{InboundMessage, MessageId};

/// Durable storage for inbound messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Stores a message under its ID, replacing any previous entry.
    async fn store(&self, message: &InboundMessage) -> StoreResult<()>;

    /// Loads a message by ID.
    async fn load(&self, id: MessageId) -> StoreResult<Option<InboundMessage>>;
}

/// A [`MessageStore`] that keeps JSON-encoded messages in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<MessageId, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored messages.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn store(&self, message: &InboundMessage) -> StoreResult<()> {
        let encoded = serde_json::to_vec(message)?;
        self.entries.write().insert(message.id(), encoded);
        Ok(())
    }

    async fn load(&self, id: MessageId) -> StoreResult<Option<InboundMessage>> {
        let encoded = self.entries.read().get(&id).cloned();
        match encoded {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Segment, Sender, TempMessage};

    #[tokio::test]
    async fn test_store_and_load() {
        let store = MemoryStore::new();
        let message: InboundMessage = TempMessage {
            id: 11,
            time: 0,
            group_id: 3,
            group_name: String::new(),
            sender: Sender::new(4),
            elements: vec![Segment::text("hello")],
        }
        .into();

        store.store(&message).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(11).await.unwrap(), Some(message));
        assert_eq!(store.load(12).await.unwrap(), None);
    }
}
