//! Block pattern matching.
//!
//! The [`PatternMatcher`] selects which block of a candidate set answers an
//! incoming event. Candidates are first narrowed by channel and subscriber
//! labels, then tried rule by rule:
//!
//! 1. **Payload**: button/quick-reply codes, content payloads
//!    (`CODE:content`) and structured payload types such as `location`
//! 2. **Text**: regex (`/re/`, case-insensitive), a payload label typed as
//!    text, or a literal, all compared against the trimmed text
//! 3. **NLU**: the block whose first satisfied entity pattern has the most
//!    conditions
//!
//! The first candidate satisfying a rule wins; later rules are only tried when
//! no candidate satisfied an earlier one.
//!
//! # Example
//!
//! ```rust,ignore
//! let matcher = PatternMatcher::new();
//! if let Some(found) = matcher.match_block(&event, &candidates) {
//!     debug!(block = %found.block.name, kind = ?found.kind, "Matched");
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use hexabot_core::model::{Block, NlpMatch, NlpParse, NlpPattern, Payload, Pattern, PayloadPattern};
use hexabot_core::{CONSOLE_CHANNEL_NAME, Event};
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use tracing::{debug, trace, warn};

/// Which rule selected the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Payload,
    Text,
    Nlp,
}

/// A matched block together with what matched.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMatch {
    pub block: Block,
    pub kind: MatchKind,
    /// Regex groups (or the whole text for literal matches).
    pub captures: Vec<String>,
}

/// Compiled regexes keyed by source; `None` records an invalid pattern.
type RegexCache = HashMap<String, Option<Regex>>;

/// Selects the block answering an event.
///
/// Cloning is cheap: the regex cache is shared between clones.
#[derive(Clone, Default)]
pub struct PatternMatcher {
    regexes: Arc<Mutex<RegexCache>>,
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the block of `candidates` that answers `event`, if any.
    pub fn match_block(&self, event: &Event, candidates: &[Block]) -> Option<BlockMatch> {
        if candidates.is_empty() {
            return None;
        }

        let blocks = self.filter_candidates(event, candidates);
        trace!(
            candidates = candidates.len(),
            eligible = blocks.len(),
            "Filtered candidate blocks"
        );

        if let Some(payload) = event.payload() {
            if let Some(block) = blocks
                .iter()
                .find(|b| self.match_payload(&payload, b).is_some())
            {
                return Some(BlockMatch {
                    block: (*block).clone(),
                    kind: MatchKind::Payload,
                    captures: Vec::new(),
                });
            }
        }

        let text = event.text();
        let text = text.trim();
        for block in &blocks {
            if let Some(captures) = self.match_text(text, block) {
                return Some(BlockMatch {
                    block: (*block).clone(),
                    kind: MatchKind::Text,
                    captures,
                });
            }
        }

        let nlp = event.nlp()?;
        let mut best: Option<(&Block, usize)> = None;
        for block in &blocks {
            if let Some(pattern) = self.match_nlp(nlp, block) {
                if best.is_none_or(|(_, len)| pattern.len() > len) {
                    best = Some((block, pattern.len()));
                }
            }
        }

        best.map(|(block, _)| BlockMatch {
            block: block.clone(),
            kind: MatchKind::Nlp,
            captures: Vec::new(),
        })
    }

    /// Applies the channel and label filters, then orders label-targeted
    /// blocks first.
    fn filter_candidates<'a>(&self, event: &Event, candidates: &'a [Block]) -> Vec<&'a Block> {
        let channel = event.channel_name();
        let labels: &[String] = event.sender().map(|s| s.labels.as_slice()).unwrap_or(&[]);

        let mut blocks: Vec<&Block> = candidates
            .iter()
            .filter(|b| {
                b.trigger_channels.is_empty()
                    || channel == CONSOLE_CHANNEL_NAME
                    || b.trigger_channels.iter().any(|c| c == channel)
            })
            .filter(|b| {
                b.trigger_labels.is_empty() || b.trigger_labels.iter().any(|l| labels.contains(l))
            })
            .collect();

        // Stable: equal label counts keep their candidate order.
        blocks.sort_by(|a, b| b.trigger_labels.len().cmp(&a.trigger_labels.len()));
        blocks
    }

    /// Returns the payload pattern of `block` matching `payload`.
    pub fn match_payload<'a>(&self, payload: &Payload, block: &'a Block) -> Option<&'a PayloadPattern> {
        block.patterns.iter().find_map(|pattern| {
            let Pattern::Payload(pt) = pattern else {
                return None;
            };
            let matched = match payload {
                Payload::Code(code) => {
                    !pt.value.is_empty()
                        && (code == &pt.value
                            || code
                                .strip_prefix(pt.value.as_str())
                                .is_some_and(|rest| rest.starts_with(':')))
                }
                Payload::Structured(_) => {
                    pt.kind.is_some() && pt.kind.as_deref() == payload.type_name()
                }
            };
            matched.then_some(pt)
        })
    }

    /// Tries the text patterns of `block` in declaration order.
    ///
    /// Returns the regex groups (the whole match when the regex has none) or
    /// the text itself for literal and label matches.
    pub fn match_text(&self, text: &str, block: &Block) -> Option<Vec<String>> {
        let lowered = text.trim().to_lowercase();

        for pattern in &block.patterns {
            if let Some(source) = pattern.regex_source() {
                let Some(regex) = self.regex(source) else {
                    continue;
                };
                if let Some(caps) = regex.captures(text) {
                    let groups: Vec<String> = if caps.len() >= 2 {
                        caps.iter()
                            .skip(1)
                            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                            .collect()
                    } else {
                        vec![caps[0].to_string()]
                    };
                    return Some(groups);
                }
                continue;
            }

            match pattern {
                Pattern::Payload(pt) if lowered == pt.label.to_lowercase() => {
                    return Some(vec![text.to_string()]);
                }
                Pattern::Text(literal) if lowered == literal.to_lowercase() => {
                    return Some(vec![text.to_string()]);
                }
                _ => {}
            }
        }

        None
    }

    /// Returns the first NLU pattern of `block` fully satisfied by `nlp`.
    pub fn match_nlp<'a>(&self, nlp: &NlpParse, block: &'a Block) -> Option<&'a [NlpPattern]> {
        if nlp.is_empty() {
            return None;
        }

        block.patterns.iter().find_map(|pattern| {
            let Pattern::Nlp(conditions) = pattern else {
                return None;
            };
            let satisfied = conditions.iter().all(|cond| match cond.match_type {
                NlpMatch::Value => nlp.has_value(&cond.entity, &cond.value),
                NlpMatch::Entity => nlp.find(&cond.entity).is_some(),
            });
            satisfied.then_some(conditions.as_slice())
        })
    }

    fn regex(&self, source: &str) -> Option<Regex> {
        let mut cache = self.regexes.lock();
        cache
            .entry(source.to_string())
            .or_insert_with(|| {
                match RegexBuilder::new(source).case_insensitive(true).build() {
                    Ok(regex) => Some(regex),
                    Err(err) => {
                        warn!(pattern = %source, error = %err, "Skipping invalid regex pattern");
                        None
                    }
                }
            })
            .clone()
    }
}

impl std::fmt::Debug for PatternMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternMatcher")
            .field("cached_regexes", &self.regexes.lock().len())
            .finish()
    }
}

/// Sets the sender language from the NLU `language` entity.
///
/// Only languages listed in `languages` are accepted. Returns the detected
/// language when it was applied.
pub fn detect_language(event: &mut Event, languages: &[String]) -> Option<String> {
    let lang = event
        .nlp()?
        .find("language")
        .map(|e| e.value.clone())
        .filter(|value| languages.contains(value))?;

    let sender = event.sender_mut()?;
    if sender.language.as_deref() != Some(lang.as_str()) {
        debug!(sender = %sender.id, language = %lang, "Detected subscriber language");
        sender.language = Some(lang.clone());
    }
    Some(lang)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexabot_core::model::{BlockMessage, NlpPattern, Subscriber};
    use hexabot_core::{ChannelEvent, WebEvent};
    use serde_json::json;

    fn block(id: &str, patterns: Vec<Pattern>) -> Block {
        Block::new(id, id, BlockMessage::texts([id])).with_patterns(patterns)
    }

    fn web_event(raw: serde_json::Value) -> Event {
        let ev: WebEvent = serde_json::from_value(raw).unwrap();
        Event::new(ChannelEvent::Web(ev)).with_sender(Subscriber::new("s1", "u1", "web-channel"))
    }

    #[test]
    fn test_literal_is_case_insensitive_and_trimmed() {
        let matcher = PatternMatcher::new();
        let blocks = vec![block("greet", vec![Pattern::text("Hello")])];
        let event = Event::web_text("u1", "  hELLo ");

        let found = matcher.match_block(&event, &blocks).unwrap();
        assert_eq!(found.block.id, "greet");
        assert_eq!(found.kind, MatchKind::Text);
    }

    #[test]
    fn test_regex_returns_groups() {
        let matcher = PatternMatcher::new();
        let blocks = vec![block("order", vec![Pattern::text("/^order (\\d+)$/")])];

        let captures = matcher.match_text("ORDER 42", &blocks[0]).unwrap();
        assert_eq!(captures, vec!["42".to_string()]);

        let whole = block("hi", vec![Pattern::text("/^hi+$/")]);
        assert_eq!(matcher.match_text("hiii", &whole), Some(vec!["hiii".to_string()]));
    }

    #[test]
    fn test_invalid_regex_is_skipped() {
        let matcher = PatternMatcher::new();
        let b = block("broken", vec![Pattern::text("/(unclosed/"), Pattern::text("fine")]);
        assert!(matcher.match_text("(unclosed", &b).is_none());
        assert!(matcher.match_text("fine", &b).is_some());
    }

    #[test]
    fn test_payload_prefix_and_structured_type() {
        let matcher = PatternMatcher::new();
        let menu = block("menu", vec![Pattern::payload("Menu", "MENU")]);
        let mut location = block("loc", vec![Pattern::payload("Location", "")]);
        if let Pattern::Payload(pt) = &mut location.patterns[0] {
            pt.kind = Some("location".into());
        }

        assert!(matcher.match_payload(&Payload::from("MENU"), &menu).is_some());
        assert!(matcher.match_payload(&Payload::from("MENU:pizza"), &menu).is_some());
        assert!(matcher.match_payload(&Payload::from("MENUS"), &menu).is_none());

        let event = web_event(json!({
            "type": "location",
            "data": { "coordinates": { "lat": 1.0, "lng": 2.0 } },
            "author": "u1"
        }));
        let found = matcher.match_block(&event, &[menu, location]).unwrap();
        assert_eq!(found.block.id, "loc");
        assert_eq!(found.kind, MatchKind::Payload);
    }

    #[test]
    fn test_payload_beats_text() {
        let matcher = PatternMatcher::new();
        let by_text = block("by-text", vec![Pattern::text("Yes")]);
        let by_payload = block("by-payload", vec![Pattern::payload("Yes", "YES")]);
        let event = Event::web_postback("u1", "Yes", "YES");

        let found = matcher.match_block(&event, &[by_text, by_payload]).unwrap();
        assert_eq!(found.block.id, "by-payload");
    }

    #[test]
    fn test_label_typed_as_text() {
        let matcher = PatternMatcher::new();
        let b = block("qr", vec![Pattern::payload("Get Started", "GET_STARTED")]);
        let event = Event::web_text("u1", "get started");
        assert_eq!(matcher.match_block(&event, &[b]).unwrap().block.id, "qr");
    }

    #[test]
    fn test_channel_and_label_filters() {
        let matcher = PatternMatcher::new();
        let mut messenger_only = block("messenger", vec![Pattern::text("hi")]);
        messenger_only.trigger_channels = vec!["messenger-channel".into()];
        let mut vip = block("vip", vec![Pattern::text("hi")]);
        vip.trigger_labels = vec!["vip".into()];
        let open = block("open", vec![Pattern::text("hi")]);
        let candidates = vec![messenger_only, open, vip];

        let anonymous = Event::web_text("u1", "hi");
        assert_eq!(matcher.match_block(&anonymous, &candidates).unwrap().block.id, "open");

        let mut subscriber = Subscriber::new("s1", "u1", "web-channel");
        subscriber.labels = vec!["vip".into()];
        let labelled = Event::web_text("u1", "hi").with_sender(subscriber);
        assert_eq!(matcher.match_block(&labelled, &candidates).unwrap().block.id, "vip");
    }

    #[test]
    fn test_nlp_prefers_most_specific_pattern() {
        let matcher = PatternMatcher::new();
        let broad = block("broad", vec![Pattern::Nlp(vec![NlpPattern::value("intent", "greet")])]);
        let specific = block(
            "specific",
            vec![Pattern::Nlp(vec![
                NlpPattern::value("intent", "greet"),
                NlpPattern::entity("firstname"),
            ])],
        );
        let event = Event::web_text("u1", "hey there john").with_nlp(NlpParse::from_pairs([
            ("intent", "greet"),
            ("firstname", "john"),
        ]));

        let found = matcher.match_block(&event, &[broad, specific]).unwrap();
        assert_eq!(found.block.id, "specific");
        assert_eq!(found.kind, MatchKind::Nlp);
    }

    #[test]
    fn test_no_match() {
        let matcher = PatternMatcher::new();
        let blocks = vec![block("greet", vec![Pattern::text("hello")])];
        assert!(matcher.match_block(&Event::web_text("u1", "bye"), &blocks).is_none());
        assert!(matcher.match_block(&Event::web_text("u1", "bye"), &[]).is_none());
    }

    #[test]
    fn test_detect_language() {
        let languages = vec!["en".to_string(), "fr".to_string()];
        let mut event = web_event(json!({ "type": "text", "data": { "text": "bonjour" } }))
            .with_nlp(NlpParse::from_pairs([("language", "fr")]));

        assert_eq!(detect_language(&mut event, &languages), Some("fr".to_string()));
        assert_eq!(event.sender().unwrap().language.as_deref(), Some("fr"));

        let mut unknown = Event::web_text("u1", "hallo")
            .with_sender(Subscriber::new("s1", "u1", "web-channel"))
            .with_nlp(NlpParse::from_pairs([("language", "de")]));
        assert_eq!(detect_language(&mut unknown, &languages), None);
    }
}
