//! Telemetry pump.
//!
//! The engine emits [`TelemetryEvent`]s synchronously. [`TelemetryPump`]
//! hands it a sink that only pushes onto an unbounded channel; a background
//! task logs each event and folds statistics into a [`StatsSnapshot`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use hexabot_core::{BoxedTelemetry, StatsKind, TelemetryEvent, TelemetrySink};
use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Counters folded from telemetry events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    /// `stats:entry` counts per kind.
    pub totals: BTreeMap<StatsKind, u64>,
    /// `stats:entry` counts per kind and label (block name for `popular`).
    pub labels: BTreeMap<StatsKind, BTreeMap<String, u64>>,
    pub messages_sent: u64,
    pub conversations_ended: u64,
    pub conversations_failed: u64,
    pub local_fallbacks: u64,
    pub global_fallbacks: u64,
}

impl StatsSnapshot {
    pub fn record(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::StatsEntry { kind, label } => {
                *self.totals.entry(*kind).or_default() += 1;
                *self
                    .labels
                    .entry(*kind)
                    .or_default()
                    .entry(label.clone())
                    .or_default() += 1;
            }
            TelemetryEvent::ConversationEnd { error, .. } => {
                self.conversations_ended += 1;
                if error.is_some() {
                    self.conversations_failed += 1;
                }
            }
            TelemetryEvent::MessageSent { .. } => self.messages_sent += 1,
            TelemetryEvent::BlockTriggered { fallback: true, .. } => self.local_fallbacks += 1,
            TelemetryEvent::BlockTriggered { .. } => {}
            TelemetryEvent::GlobalFallback { .. } => self.global_fallbacks += 1,
        }
    }

    pub fn total(&self, kind: StatsKind) -> u64 {
        self.totals.get(&kind).copied().unwrap_or_default()
    }

    pub fn count(&self, kind: StatsKind, label: &str) -> u64 {
        self.labels
            .get(&kind)
            .and_then(|labels| labels.get(label))
            .copied()
            .unwrap_or_default()
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats: {} sent, {} new / {} existing conversations, {} ended ({} failed), {} local / {} global fallbacks",
            self.messages_sent,
            self.total(StatsKind::NewConversations),
            self.total(StatsKind::ExistingConversations),
            self.conversations_ended,
            self.conversations_failed,
            self.local_fallbacks,
            self.global_fallbacks,
        )
    }
}

/// Engine-facing sink; never blocks.
struct ChannelSink {
    tx: UnboundedSender<TelemetryEvent>,
}

impl TelemetrySink for ChannelSink {
    fn emit(&self, event: TelemetryEvent) {
        if self.tx.send(event).is_err() {
            trace!("Telemetry pump stopped, dropping event");
        }
    }
}

/// Background consumer of telemetry events.
pub struct TelemetryPump {
    tx: UnboundedSender<TelemetryEvent>,
    stats: Arc<Mutex<StatsSnapshot>>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TelemetryPump {
    /// Spawns the pump task. Must be called within a Tokio runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = unbounded_channel();
        let stats = Arc::new(Mutex::new(StatsSnapshot::default()));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pump(rx, Arc::clone(&stats), cancel.clone()));
        debug!("Telemetry pump started");

        Self {
            tx,
            stats,
            cancel,
            handle,
        }
    }

    /// A sink feeding this pump.
    pub fn sink(&self) -> BoxedTelemetry {
        Arc::new(ChannelSink {
            tx: self.tx.clone(),
        })
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.lock().clone()
    }

    /// Drains queued events, stops the task and returns the final counters.
    pub async fn shutdown(self) -> StatsSnapshot {
        self.cancel.cancel();
        if let Err(err) = self.handle.await {
            warn!(error = %err, "Telemetry pump task failed");
        }
        let stats = self.stats.lock().clone();
        info!(%stats, "Telemetry pump stopped");
        stats
    }
}

impl fmt::Debug for TelemetryPump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryPump")
            .field("stopped", &self.cancel.is_cancelled())
            .finish()
    }
}

async fn pump(
    mut rx: UnboundedReceiver<TelemetryEvent>,
    stats: Arc<Mutex<StatsSnapshot>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => consume(&stats, event),
                None => break,
            },
            _ = cancel.cancelled() => {
                while let Ok(event) = rx.try_recv() {
                    consume(&stats, event);
                }
                break;
            }
        }
    }
}

fn consume(stats: &Mutex<StatsSnapshot>, event: TelemetryEvent) {
    match &event {
        TelemetryEvent::ConversationEnd {
            conversation,
            error: Some(error),
        } => warn!(
            hook = event.hook_name(),
            conversation_id = %conversation.id,
            error = %error,
            "Conversation ended on failure"
        ),
        TelemetryEvent::ConversationEnd { conversation, .. } => debug!(
            hook = event.hook_name(),
            conversation_id = %conversation.id,
            "Conversation ended"
        ),
        TelemetryEvent::MessageSent {
            mid,
            recipient,
            handover,
        } => debug!(
            hook = event.hook_name(),
            mid = %mid,
            recipient = %recipient,
            handover = ?handover,
            "Message sent"
        ),
        other => trace!(hook = other.hook_name(), event = ?other, "Telemetry"),
    }
    stats.lock().record(&event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexabot_core::model::Conversation;

    #[test]
    fn test_record_folds_counters() {
        let mut stats = StatsSnapshot::default();
        for event in [
            TelemetryEvent::stats(StatsKind::Popular, "greeting"),
            TelemetryEvent::stats(StatsKind::Popular, "greeting"),
            TelemetryEvent::stats(StatsKind::Popular, "menu"),
            TelemetryEvent::stats_default(StatsKind::NewConversations),
            TelemetryEvent::BlockTriggered {
                block: "menu".into(),
                fallback: true,
            },
            TelemetryEvent::ConversationEnd {
                conversation: Conversation::new("c1", "sub-1"),
                error: Some("boom".into()),
            },
        ] {
            stats.record(&event);
        }

        assert_eq!(stats.total(StatsKind::Popular), 3);
        assert_eq!(stats.count(StatsKind::Popular, "greeting"), 2);
        assert_eq!(stats.count(StatsKind::NewConversations, "New conversations"), 1);
        assert_eq!(stats.local_fallbacks, 1);
        assert_eq!(stats.conversations_failed, 1);
    }

    #[tokio::test]
    async fn test_pump_drains_on_shutdown() {
        let pump = TelemetryPump::spawn();
        let sink = pump.sink();
        for _ in 0..3 {
            sink.emit(TelemetryEvent::MessageSent {
                mid: "m".into(),
                recipient: "sub-1".into(),
                handover: None,
            });
        }
        sink.emit(TelemetryEvent::GlobalFallback {
            sender: "sub-1".into(),
        });

        let stats = pump.shutdown().await;
        assert_eq!(stats.messages_sent, 3);
        assert_eq!(stats.global_fallbacks, 1);
        assert!(stats.to_string().starts_with("Stats: 3 sent"));

        // Emitting after shutdown is silently dropped.
        sink.emit(TelemetryEvent::GlobalFallback {
            sender: "sub-1".into(),
        });
    }
}
