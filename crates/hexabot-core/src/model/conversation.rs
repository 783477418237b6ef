//! Conversation records.

use serde::{Deserialize, Serialize};

use super::block::Block;
use super::context::Context;

/// The live position of one subscriber in the flow graph.
///
/// A sender has at most one active conversation; stores enforce this on
/// creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Subscriber id.
    pub sender: String,
    pub active: bool,
    /// Block whose message was sent last.
    #[serde(default)]
    pub current: Option<Block>,
    /// Candidates for the subscriber's next message, populated.
    #[serde(default)]
    pub next: Vec<Block>,
    #[serde(default)]
    pub context: Context,
}

impl Conversation {
    /// Creates a fresh active conversation with a default context.
    pub fn new(id: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            active: true,
            current: None,
            next: Vec::new(),
            context: Context::default(),
        }
    }

    /// Ids of the next candidate blocks, in order.
    pub fn next_ids(&self) -> Vec<String> {
        self.next.iter().map(|b| b.id.clone()).collect()
    }
}
