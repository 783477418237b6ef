//! # Hexabot Core
//!
//! Shared foundation of the Hexabot conversation engine.
//!
//! This crate holds everything the engine and the channels agree on:
//!
//! - **Domain model**: blocks, patterns, conversations, context, subscribers
//!   and outgoing envelopes ([`model`])
//! - **Canonical event**: the normalized incoming event with its channel
//!   variant, resolved sender and NLU parse ([`Event`])
//! - **Collaborator contracts**: stores, NLU, channels and telemetry, each a
//!   trait the engine is generic over
//! - **In-memory stores** for tests and single-process deployments
//!
//! ## Layering
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────┐     ┌────────────────┐
//! │   Channel    │────▶│     Runtime     │────▶│     Engine     │
//! │ (web/console)│     │ (locks, config) │     │ (match, flow)  │
//! └──────────────┘     └─────────────────┘     └────────────────┘
//!         ▲                                            │
//!         └──────────── Envelope / SendResult ─────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use hexabot_core::prelude::*;
//!
//! let block = Block::new("greet", "Greeting", BlockMessage::texts(["Hi {context.user.first_name}!"]))
//!     .with_patterns([Pattern::text("hello")])
//!     .starting();
//!
//! let blocks = MemoryBlockStore::with_blocks([block]);
//! let starting = blocks.find_starting().await?;
//! ```

pub mod channel;
pub mod error;
pub mod event;
pub mod model;
pub mod store;
pub mod telemetry;

pub use channel::{BoxedChannel, Channel, ChannelRegistry, ChannelStats};
pub use error::{
    ChannelError, ChannelResult, EventError, EventResult, NluError, NluResult, StoreError,
    StoreResult,
};
pub use event::{
    CONSOLE_CHANNEL_NAME, ChannelEvent, Event, WEB_CHANNEL_NAME, WebEvent, WebMessage,
    WebMessageBody, WebStatus,
};
pub use store::{
    BlockStore, ContentPage, ContentStore, ConversationStore, MemoryBlockStore,
    MemoryContentStore, MemoryConversationStore, MemorySubscriberStore, NluService,
    SubscriberStore,
};
pub use telemetry::{BoxedTelemetry, NoopTelemetry, StatsKind, TelemetryEvent, TelemetrySink};

/// Prelude for common imports.
pub mod prelude {
    pub use super::channel::{BoxedChannel, Channel, ChannelRegistry};
    pub use super::error::*;
    pub use super::event::{CONSOLE_CHANNEL_NAME, ChannelEvent, Event, WEB_CHANNEL_NAME, WebEvent};
    pub use super::model::*;
    pub use super::store::*;
    pub use super::telemetry::{NoopTelemetry, StatsKind, TelemetryEvent, TelemetrySink};
}
