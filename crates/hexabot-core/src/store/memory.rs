//! In-memory stores.
//!
//! Backed by `tokio::sync::RwLock<HashMap<..>>`; suitable for tests, demos
//! and single-process deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::{BlockStore, ContentPage, ContentStore, ConversationStore, SubscriberStore};
use crate::error::{StoreError, StoreResult};
use crate::model::{Block, ContentOptions, Conversation, Pagination, Subscriber};

// =============================================================================
// Blocks
// =============================================================================

#[derive(Default, Clone)]
pub struct MemoryBlockStore {
    /// Insertion order is kept so starting blocks match in authoring order.
    blocks: Arc<RwLock<Vec<Block>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        Self {
            blocks: Arc::new(RwLock::new(blocks.into_iter().collect())),
        }
    }

    /// Inserts or replaces a block.
    pub async fn upsert(&self, block: Block) {
        let mut blocks = self.blocks.write().await;
        match blocks.iter_mut().find(|b| b.id == block.id) {
            Some(existing) => *existing = block,
            None => blocks.push(block),
        }
    }

    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn find(&self, id: &str) -> StoreResult<Option<Block>> {
        let blocks = self.blocks.read().await;
        Ok(blocks.iter().find(|b| b.id == id).cloned())
    }

    async fn find_many(&self, ids: &[String]) -> StoreResult<Vec<Block>> {
        let blocks = self.blocks.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| blocks.iter().find(|b| &b.id == id).cloned())
            .collect())
    }

    async fn find_starting(&self) -> StoreResult<Vec<Block>> {
        let blocks = self.blocks.read().await;
        Ok(blocks
            .iter()
            .filter(|b| b.starts_conversation)
            .cloned()
            .collect())
    }

    async fn previous_blocks(&self, id: &str) -> StoreResult<Vec<Block>> {
        let blocks = self.blocks.read().await;
        Ok(blocks
            .iter()
            .filter(|b| b.next_blocks.iter().any(|n| n == id))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Conversations
// =============================================================================

#[derive(Default, Clone)]
pub struct MemoryConversationStore {
    conversations: Arc<RwLock<HashMap<String, Conversation>>>,
    seq: Arc<AtomicU64>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<Conversation> {
        self.conversations.read().await.get(id).cloned()
    }

    /// Number of active conversations for a sender.
    pub async fn active_count(&self, sender: &str) -> usize {
        self.conversations
            .read()
            .await
            .values()
            .filter(|c| c.active && c.sender == sender)
            .count()
    }

    /// Inserts a conversation as-is; used to seed fixtures.
    pub async fn insert(&self, conversation: Conversation) {
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation);
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn find_active_by_sender(&self, sender: &str) -> StoreResult<Option<Conversation>> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .find(|c| c.active && c.sender == sender)
            .cloned())
    }

    async fn create(&self, sender: &str) -> StoreResult<Conversation> {
        let mut conversations = self.conversations.write().await;
        if conversations.values().any(|c| c.active && c.sender == sender) {
            return Err(StoreError::conflict(format!(
                "subscriber '{sender}' already has an active conversation"
            )));
        }

        let id = format!("conv-{}", self.seq.fetch_add(1, Ordering::Relaxed) + 1);
        let conversation = Conversation::new(id.clone(), sender);
        conversations.insert(id.clone(), conversation.clone());
        debug!(conversation_id = %id, sender = %sender, "Created conversation");
        Ok(conversation)
    }

    async fn update(&self, conversation: &Conversation) -> StoreResult<Conversation> {
        let mut conversations = self.conversations.write().await;
        match conversations.get_mut(&conversation.id) {
            Some(stored) => {
                *stored = conversation.clone();
                trace!(conversation_id = %conversation.id, "Updated conversation");
                Ok(stored.clone())
            }
            None => Err(StoreError::not_found("conversation", &conversation.id)),
        }
    }

    async fn end(&self, id: &str) -> StoreResult<()> {
        let mut conversations = self.conversations.write().await;
        let stored = conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("conversation", id))?;
        stored.active = false;
        debug!(conversation_id = %id, "Ended conversation");
        Ok(())
    }
}

// =============================================================================
// Subscribers
// =============================================================================

#[derive(Default, Clone)]
pub struct MemorySubscriberStore {
    subscribers: Arc<RwLock<HashMap<String, Subscriber>>>,
    seq: Arc<AtomicU64>,
}

impl MemorySubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, subscriber: Subscriber) {
        self.subscribers
            .write()
            .await
            .insert(subscriber.id.clone(), subscriber);
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn find(&self, id: &str) -> StoreResult<Option<Subscriber>> {
        Ok(self.subscribers.read().await.get(id).cloned())
    }

    async fn find_by_foreign_id(
        &self,
        channel: &str,
        foreign_id: &str,
    ) -> StoreResult<Option<Subscriber>> {
        let subscribers = self.subscribers.read().await;
        Ok(subscribers
            .values()
            .find(|s| s.channel == channel && s.foreign_id == foreign_id)
            .cloned())
    }

    async fn get_or_create(&self, channel: &str, foreign_id: &str) -> StoreResult<Subscriber> {
        let mut subscribers = self.subscribers.write().await;
        if let Some(existing) = subscribers
            .values()
            .find(|s| s.channel == channel && s.foreign_id == foreign_id)
        {
            return Ok(existing.clone());
        }

        let id = format!("sub-{}", self.seq.fetch_add(1, Ordering::Relaxed) + 1);
        let subscriber = Subscriber::new(id.clone(), foreign_id, channel);
        subscribers.insert(id.clone(), subscriber.clone());
        debug!(subscriber_id = %id, channel = %channel, "Created subscriber");
        Ok(subscriber)
    }

    async fn update_vars(
        &self,
        id: &str,
        vars: BTreeMap<String, Value>,
    ) -> StoreResult<Subscriber> {
        let mut subscribers = self.subscribers.write().await;
        let subscriber = subscribers
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("subscriber", id))?;
        subscriber.context.vars.extend(vars);
        Ok(subscriber.clone())
    }

    async fn apply_updates(
        &self,
        id: &str,
        labels: &[String],
        assign_to: Option<&str>,
    ) -> StoreResult<Subscriber> {
        let mut subscribers = self.subscribers.write().await;
        let subscriber = subscribers
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("subscriber", id))?;
        for label in labels {
            if !subscriber.labels.contains(label) {
                subscriber.labels.push(label.clone());
            }
        }
        if let Some(agent) = assign_to {
            subscriber.assigned_to = Some(agent.to_string());
        }
        Ok(subscriber.clone())
    }
}

// =============================================================================
// Content
// =============================================================================

/// Content entries grouped by content type.
#[derive(Default, Clone)]
pub struct MemoryContentStore {
    entries: Arc<RwLock<HashMap<String, Vec<Value>>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, content_type: impl Into<String>, entry: Value) {
        self.entries
            .write()
            .await
            .entry(content_type.into())
            .or_default()
            .push(entry);
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get_content(&self, options: &ContentOptions, skip: u32) -> StoreResult<ContentPage> {
        let entries = self.entries.read().await;
        let all = entries
            .get(&options.content_type)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let skip = skip as usize;
        let limit = options.limit as usize;

        Ok(ContentPage {
            elements: all.iter().skip(skip).take(limit).cloned().collect(),
            pagination: Pagination {
                total: all.len(),
                skip,
                limit,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockMessage, ContentDisplay, ContentFields};
    use serde_json::json;

    #[tokio::test]
    async fn test_single_active_conversation_per_sender() {
        let store = MemoryConversationStore::new();
        let first = store.create("sub-1").await.unwrap();

        let second = store.create("sub-1").await;
        assert!(matches!(second, Err(StoreError::Conflict(_))));
        assert_eq!(store.active_count("sub-1").await, 1);

        store.end(&first.id).await.unwrap();
        assert!(store.find_active_by_sender("sub-1").await.unwrap().is_none());
        assert!(store.create("sub-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_find_many_preserves_order() {
        let store = MemoryBlockStore::with_blocks([
            Block::new("a", "A", BlockMessage::texts(["a"])),
            Block::new("b", "B", BlockMessage::texts(["b"])).with_next(["a"]),
        ]);

        let found = store
            .find_many(&["b".to_string(), "missing".to_string(), "a".to_string()])
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);

        let previous = store.previous_blocks("a").await.unwrap();
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].id, "b");
    }

    #[tokio::test]
    async fn test_subscriber_updates() {
        let store = MemorySubscriberStore::new();
        let sub = store.get_or_create("web-channel", "u-1").await.unwrap();
        let again = store.get_or_create("web-channel", "u-1").await.unwrap();
        assert_eq!(sub.id, again.id);

        let mut vars = BTreeMap::new();
        vars.insert("phone".to_string(), json!("+1 514"));
        let updated = store.update_vars(&sub.id, vars).await.unwrap();
        assert_eq!(updated.context.vars["phone"], json!("+1 514"));

        let labels = vec!["vip".to_string()];
        let updated = store
            .apply_updates(&sub.id, &labels, Some("agent-1"))
            .await
            .unwrap();
        assert_eq!(updated.labels, labels);
        assert_eq!(updated.assigned_to.as_deref(), Some("agent-1"));
    }

    #[tokio::test]
    async fn test_content_pagination() {
        let store = MemoryContentStore::new();
        for i in 0..5 {
            store.insert("product", json!({ "title": format!("P{i}") })).await;
        }
        let options = ContentOptions {
            display: ContentDisplay::List,
            content_type: "product".into(),
            fields: ContentFields::default(),
            buttons: vec![],
            limit: 2,
            top_element_style: None,
        };

        let page = store.get_content(&options, 4).await.unwrap();
        assert_eq!(page.elements.len(), 1);
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.skip, 4);
    }
}
