//! Fire-and-forget telemetry hooks.
//!
//! The engine reports statistics and lifecycle notifications through a
//! [`TelemetrySink`]. Emission is synchronous and must never block: sinks
//! that do real work forward events to a queue and return immediately.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::Conversation;

/// Statistic counters fed by `stats:entry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsKind {
    Popular,
    NewConversations,
    ExistingConversations,
    Outgoing,
    AllMessages,
}

impl StatsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Popular => "popular",
            Self::NewConversations => "new_conversations",
            Self::ExistingConversations => "existing_conversations",
            Self::Outgoing => "outgoing",
            Self::AllMessages => "all_messages",
        }
    }

    /// Label used when the entry is not keyed by a block name.
    pub fn default_label(&self) -> &'static str {
        match self {
            Self::Popular => "Popular blocks",
            Self::NewConversations => "New conversations",
            Self::ExistingConversations => "Existing conversations",
            Self::Outgoing => "Outgoing",
            Self::AllMessages => "All Messages",
        }
    }
}

impl fmt::Display for StatsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// `stats:entry`
    StatsEntry { kind: StatsKind, label: String },
    /// `conversation:end`, carrying the terminal conversation.
    ConversationEnd {
        conversation: Conversation,
        /// Set when the conversation ended because of a failure.
        error: Option<String>,
    },
    /// `message:sent`
    MessageSent {
        mid: String,
        recipient: String,
        /// Agent the subscriber was handed over to, if any.
        handover: Option<String>,
    },
    /// `analytics:block` or `analytics:fallback-local`.
    BlockTriggered { block: String, fallback: bool },
    /// `analytics:fallback-global`
    GlobalFallback { sender: String },
}

impl TelemetryEvent {
    pub fn stats(kind: StatsKind, label: impl Into<String>) -> Self {
        Self::StatsEntry {
            kind,
            label: label.into(),
        }
    }

    /// Stats entry keyed by the kind's default label.
    pub fn stats_default(kind: StatsKind) -> Self {
        Self::stats(kind, kind.default_label())
    }

    /// Hook name the event is published under.
    pub fn hook_name(&self) -> &'static str {
        match self {
            Self::StatsEntry { .. } => "stats:entry",
            Self::ConversationEnd { .. } => "conversation:end",
            Self::MessageSent { .. } => "message:sent",
            Self::BlockTriggered { fallback: false, .. } => "analytics:block",
            Self::BlockTriggered { fallback: true, .. } => "analytics:fallback-local",
            Self::GlobalFallback { .. } => "analytics:fallback-global",
        }
    }
}

pub trait TelemetrySink: Send + Sync {
    /// Publishes an event. Must not block.
    fn emit(&self, event: TelemetryEvent);
}

pub type BoxedTelemetry = Arc<dyn TelemetrySink>;

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn emit(&self, _event: TelemetryEvent) {}
}

impl<F> TelemetrySink for F
where
    F: Fn(TelemetryEvent) + Send + Sync,
{
    fn emit(&self, event: TelemetryEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_hook_names() {
        assert_eq!(
            TelemetryEvent::stats_default(StatsKind::NewConversations).hook_name(),
            "stats:entry"
        );
        let local = TelemetryEvent::BlockTriggered {
            block: "greeting".into(),
            fallback: true,
        };
        assert_eq!(local.hook_name(), "analytics:fallback-local");
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let sink: BoxedTelemetry = Arc::new(move |event: TelemetryEvent| {
            captured.lock().push(event);
        });

        sink.emit(TelemetryEvent::stats_default(StatsKind::NewConversations));

        let seen = seen.lock();
        assert_eq!(
            seen[0],
            TelemetryEvent::StatsEntry {
                kind: StatsKind::NewConversations,
                label: "New conversations".into(),
            }
        );
    }
}
