//! # Hexabot
//!
//! A conversation engine for block-based chatbot flows.
//!
//! ## Overview
//!
//! A flow is a graph of blocks. Each block carries trigger patterns, a message
//! and the blocks that may follow it. For every incoming message the engine
//! picks the block to answer with, keeps the conversation state of the
//! subscriber and decides where the conversation goes next.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────────────────────┐
//! │   Channel   │────▶│   Runtime    │────▶│ Engine                       │──▶ stores
//! │ (web/console│     │ (turn locks, │     │  matcher → context → message │
//! │   widget)   │◀────│  NLU, stats) │     │  start / continue / fallback │
//! └─────────────┘     └──────────────┘     └──────────────────────────────┘
//! ```
//!
//! - **Channels**: parse widget payloads and deliver formatted replies
//! - **Runtime**: configuration, logging, per-subscriber turn serialization
//! - **Engine**: pattern matching, context capture, fallback and block traversal
//! - **Stores**: blocks, conversations, subscribers and content behind traits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hexabot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let greet = Block::new("greet", "Greeting", BlockMessage::texts(["Hello {context.user.first_name}!"]))
//!         .with_patterns([Pattern::text("hi")])
//!         .starting();
//!
//!     let runtime = HexabotRuntime::builder()
//!         .blocks(Arc::new(MemoryBlockStore::with_blocks([greet])))
//!         .build()?;
//!
//!     runtime.handle_raw(WEB_CHANNEL_NAME, &payload).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use hexabot_channel_web as channel_web;
pub use hexabot_core as core;
pub use hexabot_framework as framework;
pub use hexabot_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use hexabot::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use hexabot_runtime::{HexabotConfig, HexabotRuntime, RuntimeError, RuntimeResult};

    // Engine
    pub use hexabot_framework::prelude::*;

    // Model, stores and channel contracts
    pub use hexabot_core::prelude::*;

    // Built-in channels
    pub use hexabot_channel_web::WidgetChannel;

    pub use std::sync::Arc;
}
