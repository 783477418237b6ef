//! Subscribers: channel profiles the bot talks to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Context persisted on the subscriber across conversations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriberContext {
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    /// Identifier of the profile on its channel.
    pub foreign_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Agent the subscriber was handed over to.
    #[serde(default)]
    pub assigned_to: Option<String>,
    pub channel: String,
    #[serde(default)]
    pub context: SubscriberContext,
}

impl Subscriber {
    pub fn new(
        id: impl Into<String>,
        foreign_id: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            foreign_id: foreign_id.into(),
            first_name: String::new(),
            last_name: String::new(),
            language: None,
            labels: Vec::new(),
            assigned_to: None,
            channel: channel.into(),
            context: SubscriberContext::default(),
        }
    }

    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    pub fn has_any_label(&self, labels: &[String]) -> bool {
        labels.iter().any(|l| self.labels.contains(l))
    }
}
