//! Raw widget payload to canonical event.

use hexabot_core::{
    CONSOLE_CHANNEL_NAME, ChannelEvent, Event, EventError, EventResult, WEB_CHANNEL_NAME, WebEvent,
};
use serde_json::Value;
use tracing::{trace, warn};

/// Parses a raw JSON payload received on `channel`.
///
/// Unrecognized widget events are kept as [`WebEvent::Unknown`] rather than
/// rejected; only malformed known events and unknown channels fail.
pub fn parse(channel: &str, raw: &Value) -> EventResult<Event> {
    let widget = parse_widget(raw)?;
    let inner = match channel {
        WEB_CHANNEL_NAME => ChannelEvent::Web(widget),
        CONSOLE_CHANNEL_NAME => ChannelEvent::Console(widget),
        other => return Err(EventError::parse(format!("unknown channel '{other}'"))),
    };

    let event = Event::new(inner);
    trace!(
        channel = %channel,
        event_type = ?event.event_type(),
        message_type = ?event.message_type(),
        "Parsed widget event"
    );
    Ok(event)
}

fn parse_widget(raw: &Value) -> EventResult<WebEvent> {
    if !raw.is_object() {
        return Err(EventError::parse("widget event must be a JSON object"));
    }

    let event: WebEvent = serde_json::from_value(raw.clone())?;
    if let WebEvent::Unknown(value) = &event {
        // Known types that fell through to `Unknown` are malformed.
        if let Some(kind) = value.get("type").and_then(Value::as_str)
            && is_known_type(kind)
        {
            return Err(EventError::parse(format!("malformed '{kind}' event")));
        }
        warn!(raw = %value, "Unrecognized widget event");
    }
    Ok(event)
}

fn is_known_type(kind: &str) -> bool {
    matches!(
        kind,
        "text" | "quick_reply" | "postback" | "location" | "file" | "delivery" | "read" | "typing"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexabot_core::model::{EventType, IncomingMessageType, Payload};
    use serde_json::json;

    #[test]
    fn test_parse_per_channel() {
        let raw = json!({ "type": "text", "data": { "text": "Hello" }, "author": "u-1" });

        let web = parse(WEB_CHANNEL_NAME, &raw).unwrap();
        assert_eq!(web.channel_name(), WEB_CHANNEL_NAME);
        assert_eq!(web.text(), "Hello");

        let console = parse(CONSOLE_CHANNEL_NAME, &raw).unwrap();
        assert_eq!(console.channel_name(), CONSOLE_CHANNEL_NAME);
        assert_eq!(console.sender_foreign_id().unwrap(), "u-1");
    }

    #[test]
    fn test_quick_reply_payload() {
        let raw = json!({
            "type": "quick_reply",
            "data": { "text": "Yes", "payload": "YES" },
            "author": "u-1"
        });
        let event = parse(WEB_CHANNEL_NAME, &raw).unwrap();

        assert_eq!(event.message_type(), IncomingMessageType::QuickReply);
        assert_eq!(event.payload(), Some(Payload::Code("YES".into())));
    }

    #[test]
    fn test_status_events() {
        let event = parse(WEB_CHANNEL_NAME, &json!({ "type": "delivery", "mid": "m-1" })).unwrap();
        assert_eq!(event.event_type(), EventType::Delivery);
        assert!(event.sender_foreign_id().is_err());

        let event = parse(WEB_CHANNEL_NAME, &json!({ "type": "typing" })).unwrap();
        assert_eq!(event.event_type(), EventType::Typing);
    }

    #[test]
    fn test_unknown_and_malformed() {
        let event = parse(WEB_CHANNEL_NAME, &json!({ "type": "reaction", "emoji": "+1" })).unwrap();
        assert_eq!(event.event_type(), EventType::Unknown);

        // A text event without its data is an error, not an unknown event.
        let result = parse(WEB_CHANNEL_NAME, &json!({ "type": "text", "author": "u-1" }));
        assert!(matches!(result, Err(EventError::Parse { .. })));

        assert!(parse(WEB_CHANNEL_NAME, &json!("hello")).is_err());
        assert!(parse("messenger", &json!({ "type": "typing" })).is_err());
    }
}
