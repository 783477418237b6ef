//! # Hexabot Web Channel
//!
//! Channels speaking the chat widget protocol: the public web widget
//! (`web-channel`) and the admin console test widget (`console-channel`).
//!
//! - [`parse`] turns a raw widget payload into a canonical [`Event`]
//! - [`WidgetChannel`] formats outgoing envelopes into widget messages and
//!   queues them for delivery
//!
//! ## Example
//!
//! ```rust,ignore
//! use hexabot_channel_web::{WidgetChannel, parse};
//!
//! let channels = ChannelRegistry::new();
//! channels.register(Arc::new(WidgetChannel::web()));
//!
//! let event = parse("web-channel", &json!({
//!     "type": "text",
//!     "data": { "text": "Hello" },
//!     "author": "visitor-42"
//! }))?;
//! ```
//!
//! [`Event`]: hexabot_core::Event

pub mod channel;
pub mod event;
pub mod format;

pub use channel::{Delivery, WidgetChannel};
pub use event::parse;
pub use format::{BOT_AUTHOR, VIEW_MORE_TITLE, WidgetMessage, format_envelope};
