//! # Hexabot Framework
//!
//! The conversation engine and everything it needs to answer a message:
//!
//! - [`PatternMatcher`]: selects the block answering an event (payload, then
//!   text and regex, then NLU)
//! - [`ContextBuilder`]: folds an event into the conversation context and
//!   persists captured variables
//! - [`BlockMessageProcessor`]: renders a block into an outgoing envelope,
//!   with token replacement, content pagination and plugin executors
//! - [`BotEngine`]: the turn state machine (start, continue, fall back, end)
//! - [`EngineService`]: the engine as a `tower::Service<Event>`
//!
//! ## Example
//!
//! ```rust,ignore
//! use hexabot_framework::prelude::*;
//!
//! let engine = BotEngine::builder(blocks, conversations, subscribers, channels)
//!     .settings(settings)
//!     .build();
//!
//! let outcome = engine.handle_message_event(event).await?;
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod matcher;
pub mod message;
pub mod service;

pub use context::{ContextBuilder, ContextUpdate, build_context};
pub use engine::{BotEngine, BotEngineBuilder, EngineSettings, GLOBAL_FALLBACK_BLOCK_ID, TurnOutcome};
pub use error::{EngineError, EngineResult, EventSkipped, MessageError, MessageResult};
pub use executor::{BlockExecutor, BoxedExecutor, ExecutorRegistry};
pub use matcher::{BlockMatch, MatchKind, PatternMatcher, detect_language};
pub use message::{BlockMessageProcessor, replace_tokens};
pub use service::{
    BoxedEngineService, EngineService, EventPredicate, ServiceBuilderExt, is_skipped,
    message_events,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::engine::{BotEngine, EngineSettings, TurnOutcome};
    pub use super::error::{EngineError, EngineResult, MessageError, MessageResult};
    pub use super::executor::{BlockExecutor, ExecutorRegistry};
    pub use super::service::{EngineService, ServiceBuilderExt, message_events};
}
