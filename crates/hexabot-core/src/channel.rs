//! Channel trait and registry.
//!
//! A channel delivers outgoing envelopes to a subscriber on one messaging
//! platform. Channels are registered by name and resolved per event from
//! [`Event::channel_name`].
//!
//! # Example
//!
//! ```rust,ignore
//! struct LogChannel;
//!
//! #[async_trait]
//! impl Channel for LogChannel {
//!     fn name(&self) -> &str {
//!         "log-channel"
//!     }
//!
//!     async fn send_message(
//!         &self,
//!         event: &Event,
//!         envelope: &Envelope,
//!         _options: &SendOptions,
//!         _context: &Context,
//!     ) -> ChannelResult<SendResult> {
//!         println!("{:?}", envelope.text_content());
//!         Ok(SendResult { mid: "log-1".into() })
//!     }
//! }
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ChannelError, ChannelResult};
use crate::event::Event;
use crate::model::{Context, Envelope, SendOptions, SendResult};

#[async_trait]
pub trait Channel: Send + Sync {
    /// Registered name, e.g. `web-channel`.
    fn name(&self) -> &str;

    /// Delivers `envelope` to the sender of `event`.
    async fn send_message(
        &self,
        event: &Event,
        envelope: &Envelope,
        options: &SendOptions,
        context: &Context,
    ) -> ChannelResult<SendResult>;

    /// Enables downcasting to the concrete channel.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared channel trait object.
pub type BoxedChannel = Arc<dyn Channel>;

/// Name-indexed set of channels.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<RwLock<HashMap<String, BoxedChannel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel, replacing any channel with the same name.
    pub fn register(&self, channel: BoxedChannel) {
        let name = channel.name().to_string();
        self.channels.write().insert(name.clone(), channel);
        debug!(channel = %name, "Registered channel");
    }

    pub fn get(&self, name: &str) -> Option<BoxedChannel> {
        self.channels.read().get(name).cloned()
    }

    /// Like [`get`](Self::get), failing with [`ChannelError::NotRegistered`].
    pub fn require(&self, name: &str) -> ChannelResult<BoxedChannel> {
        self.get(name)
            .ok_or_else(|| ChannelError::NotRegistered(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.channels.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats { names: self.names() }
    }
}

/// Snapshot of the registered channels.
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    pub names: Vec<String>,
}

impl fmt::Display for ChannelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Channels: {} registered [{}]",
            self.names.len(),
            self.names.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedChannel(&'static str);

    #[async_trait]
    impl Channel for NamedChannel {
        fn name(&self) -> &str {
            self.0
        }

        async fn send_message(
            &self,
            _event: &Event,
            _envelope: &Envelope,
            _options: &SendOptions,
            _context: &Context,
        ) -> ChannelResult<SendResult> {
            Ok(SendResult {
                mid: format!("{}-mid", self.0),
            })
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(NamedChannel("web-channel")));
        registry.register(Arc::new(NamedChannel("console-channel")));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("web-channel").is_some());
        assert!(matches!(
            registry.require("sms"),
            Err(ChannelError::NotRegistered(name)) if name == "sms"
        ));
        assert_eq!(
            registry.stats().to_string(),
            "Channels: 2 registered [console-channel, web-channel]"
        );
    }

    #[test]
    fn test_downcast() {
        let channel: BoxedChannel = Arc::new(NamedChannel("web-channel"));
        let concrete = channel.as_any().downcast::<NamedChannel>().ok();
        assert_eq!(concrete.map(|c| c.0), Some("web-channel"));
    }
}
