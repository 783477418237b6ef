//! Per-conversation context carried from one turn to the next.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::Payload;
use super::nlp::NlpParse;

/// Snapshot of the subscriber identity fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Last known location of the subscriber.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<BTreeMap<String, Value>>,
}

/// The mutable state of a conversation.
///
/// Field names follow the wire representation used by flow authors in
/// token replacements (`{context.vars.phone}`, `{context.user.first_name}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub user: UserSnapshot,
    #[serde(default)]
    pub user_location: UserLocation,
    /// Captured context variables.
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
    /// Pagination offset per list/carousel block id.
    #[serde(default)]
    pub skip: BTreeMap<String, u32>,
    /// Consecutive local fallback attempts.
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub nlp: Option<NlpParse>,
    #[serde(default)]
    pub payload: Option<Payload>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl Context {
    /// Pagination offset for a block, `0` when never paginated.
    pub fn skip_for(&self, block_id: &str) -> u32 {
        self.skip.get(block_id).copied().unwrap_or(0)
    }
}
