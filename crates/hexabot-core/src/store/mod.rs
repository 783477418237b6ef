//! Persistence contracts consumed by the engine.
//!
//! The engine never talks to a database directly; it goes through these
//! traits. [`memory`] provides in-process implementations.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NluResult, StoreResult};
use crate::model::{Block, ContentOptions, Conversation, NlpParse, Pagination, Subscriber};

pub use memory::{MemoryBlockStore, MemoryContentStore, MemoryConversationStore, MemorySubscriberStore};

/// Read access to the flow graph.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Finds a block by id.
    async fn find(&self, id: &str) -> StoreResult<Option<Block>>;

    /// Finds the given blocks, preserving the order of `ids`. Unknown ids are
    /// skipped.
    async fn find_many(&self, ids: &[String]) -> StoreResult<Vec<Block>>;

    /// All blocks flagged `starts_conversation`.
    async fn find_starting(&self) -> StoreResult<Vec<Block>>;

    /// Blocks that list `id` in their `next_blocks`.
    async fn previous_blocks(&self, id: &str) -> StoreResult<Vec<Block>>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_active_by_sender(&self, sender: &str) -> StoreResult<Option<Conversation>>;

    /// Creates an active conversation for `sender`.
    ///
    /// Fails with [`StoreError::Conflict`](crate::StoreError::Conflict) when
    /// the sender already has one.
    async fn create(&self, sender: &str) -> StoreResult<Conversation>;

    /// Replaces the stored record and returns it.
    async fn update(&self, conversation: &Conversation) -> StoreResult<Conversation>;

    /// Marks the conversation inactive.
    async fn end(&self, id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn find(&self, id: &str) -> StoreResult<Option<Subscriber>>;

    async fn find_by_foreign_id(
        &self,
        channel: &str,
        foreign_id: &str,
    ) -> StoreResult<Option<Subscriber>>;

    /// Returns the subscriber for a channel profile, creating it if needed.
    async fn get_or_create(&self, channel: &str, foreign_id: &str) -> StoreResult<Subscriber>;

    /// Merges `vars` into the subscriber's persistent context vars.
    async fn update_vars(
        &self,
        id: &str,
        vars: BTreeMap<String, Value>,
    ) -> StoreResult<Subscriber>;

    /// Adds labels and optionally hands the subscriber over to an agent.
    async fn apply_updates(
        &self,
        id: &str,
        labels: &[String],
        assign_to: Option<&str>,
    ) -> StoreResult<Subscriber>;
}

/// One page of content for a list or carousel block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPage {
    pub elements: Vec<Value>,
    pub pagination: Pagination,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_content(&self, options: &ContentOptions, skip: u32) -> StoreResult<ContentPage>;
}

/// Natural-language understanding service.
#[async_trait]
pub trait NluService: Send + Sync {
    async fn parse(&self, text: &str) -> NluResult<NlpParse>;
}
