//! Block executors: named capabilities behind plugin blocks.
//!
//! A block whose message is `{ "plugin": "<name>", "args": .. }` delegates
//! envelope building to the [`BlockExecutor`] registered under that name.
//! Executors are collected into an [`ExecutorRegistry`] once at startup;
//! resolving a plugin block is then a table read.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Echo;
//!
//! #[async_trait]
//! impl BlockExecutor for Echo {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     async fn process(
//!         &self,
//!         _block: &Block,
//!         context: &Context,
//!         _conversation_id: Option<&str>,
//!     ) -> MessageResult<Envelope> {
//!         Ok(Envelope::text(context.text.clone().unwrap_or_default()))
//!     }
//! }
//!
//! let executors = ExecutorRegistry::new().with(Echo);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hexabot_core::model::{Block, BlockMessage, Context, Envelope};
use tracing::debug;

use crate::error::{MessageError, MessageResult};

#[async_trait]
pub trait BlockExecutor: Send + Sync {
    /// Plugin name blocks refer to.
    fn name(&self) -> &str;

    /// Builds the envelope for `block`.
    async fn process(
        &self,
        block: &Block,
        context: &Context,
        conversation_id: Option<&str>,
    ) -> MessageResult<Envelope>;
}

pub type BoxedExecutor = Arc<dyn BlockExecutor>;

/// Name-indexed table of executors.
///
/// Cloning is cheap; adding an executor to a shared registry copies the table.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: Arc<HashMap<String, BoxedExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an executor (builder pattern).
    pub fn with<E: BlockExecutor + 'static>(self, executor: E) -> Self {
        self.with_boxed(Arc::new(executor))
    }

    pub fn with_boxed(mut self, executor: BoxedExecutor) -> Self {
        let name = executor.name().to_string();
        debug!(executor = %name, "Registered block executor");
        Arc::make_mut(&mut self.executors).insert(name, executor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BoxedExecutor> {
        self.executors.get(name)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Checks that every plugin block refers to a registered executor.
    pub fn validate(&self, blocks: &[Block]) -> MessageResult<()> {
        for block in blocks {
            if let BlockMessage::Plugin { plugin, .. } = &block.message {
                if !self.executors.contains_key(plugin) {
                    return Err(MessageError::UnknownExecutor(plugin.clone()));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.executors.keys().collect();
        names.sort();
        f.debug_struct("ExecutorRegistry")
            .field("executors", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Static(&'static str);

    #[async_trait]
    impl BlockExecutor for Static {
        fn name(&self) -> &str {
            self.0
        }

        async fn process(
            &self,
            _block: &Block,
            _context: &Context,
            _conversation_id: Option<&str>,
        ) -> MessageResult<Envelope> {
            Ok(Envelope::text(self.0))
        }
    }

    #[test]
    fn test_clones_do_not_share_additions() {
        let base = ExecutorRegistry::new().with(Static("a"));
        let extended = base.clone().with(Static("b"));

        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        assert!(extended.get("b").is_some());
        assert!(base.get("b").is_none());
    }

    #[test]
    fn test_validate_plugin_blocks() {
        let registry = ExecutorRegistry::new().with(Static("weather"));
        let known = Block::new(
            "b1",
            "weather",
            BlockMessage::Plugin {
                plugin: "weather".into(),
                args: json!({}),
            },
        );
        let unknown = Block::new(
            "b2",
            "ai",
            BlockMessage::Plugin {
                plugin: "ollama".into(),
                args: json!({}),
            },
        );

        assert!(registry.validate(std::slice::from_ref(&known)).is_ok());
        assert!(matches!(
            registry.validate(&[known, unknown]),
            Err(MessageError::UnknownExecutor(name)) if name == "ollama"
        ));
    }

    #[tokio::test]
    async fn test_process_through_registry() {
        let registry = ExecutorRegistry::new().with(Static("hello"));
        let block = Block::new("b", "b", BlockMessage::texts(["x"]));
        let envelope = registry
            .get("hello")
            .unwrap()
            .process(&block, &Context::default(), None)
            .await
            .unwrap();
        assert_eq!(envelope.text_content(), Some("hello"));
    }
}
