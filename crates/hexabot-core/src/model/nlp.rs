//! NLU parse results attached to incoming events.

use serde::{Deserialize, Serialize};

/// A single entity guessed by the NLU service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlpEntity {
    /// Entity name (e.g. `intent`, `country_code`, `language`).
    pub entity: String,
    /// Guessed value.
    pub value: String,
    /// Confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f64,
}

/// Structured output of an NLU parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NlpParse {
    #[serde(default)]
    pub entities: Vec<NlpEntity>,
}

impl NlpParse {
    /// Creates a parse from `(entity, value)` pairs with full confidence.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            entities: pairs
                .into_iter()
                .map(|(entity, value)| NlpEntity {
                    entity: entity.to_string(),
                    value: value.to_string(),
                    confidence: 1.0,
                })
                .collect(),
        }
    }

    /// Returns the first entity with the given name.
    pub fn find(&self, entity: &str) -> Option<&NlpEntity> {
        self.entities.iter().find(|e| e.entity == entity)
    }

    /// Returns `true` if an entity with this exact name and value exists.
    pub fn has_value(&self, entity: &str, value: &str) -> bool {
        self.entities
            .iter()
            .any(|e| e.entity == entity && e.value == value)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
