//! Message persistence collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One stored message record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Counterpart phone number or chat id.
    pub phone: String,
    pub message_id: String,
    pub direction: Direction,
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(
        phone: impl Into<String>,
        message_id: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            phone: phone.into(),
            message_id: message_id.into(),
            direction,
            data: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Storage backend for messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn store_message(&self, message: StoredMessage) -> Result<(), StoreError>;

    /// Newest first, optionally filtered by phone, at most `limit` records.
    async fn fetch_messages(
        &self,
        phone: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError>;
}

/// Process-local store used by the binary and tests.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<StoredMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn store_message(&self, message: StoredMessage) -> Result<(), StoreError> {
        self.messages.write().await.push(message);
        Ok(())
    }

    async fn fetch_messages(
        &self,
        phone: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .rev()
            .filter(|m| phone.map_or(true, |p| m.phone == p))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_newest_first_with_filter_and_limit() {
        let store = InMemoryMessageStore::new();
        for (phone, id) in [("a", "1"), ("b", "2"), ("a", "3"), ("a", "4")] {
            store
                .store_message(StoredMessage::new(phone, id, Direction::Inbound))
                .await
                .unwrap();
        }

        let all = store.fetch_messages(None, 10).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].message_id, "4");

        let only_a = store.fetch_messages(Some("a"), 2).await.unwrap();
        let ids: Vec<_> = only_a.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["4", "3"]);
    }
}
