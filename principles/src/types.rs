//! Core types for the behavioural principle knowledge base.
//!
//! With the `typescript` feature enabled, these types can be exported to TypeScript
//! using ts-rs for consistency with the chat frontend.

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// A behavioural science principle with its triggers and interventions.
///
/// Immutable once loaded into a [`crate::PrincipleCatalog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Principle {
    /// Stable unique key (e.g. `loss_aversion`)
    pub id: String,
    /// Display name
    pub name: String,
    /// What the principle says about behaviour
    #[serde(default)]
    pub description: String,
    /// Phrases that suggest this principle applies, in priority order
    #[serde(default, alias = "typical_triggers")]
    pub trigger_keywords: Vec<String>,
    /// Suggested actions, best first
    #[serde(default)]
    pub interventions: Vec<String>,
}

impl Principle {
    /// Create a principle with no triggers or interventions.
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            trigger_keywords: Vec::new(),
            interventions: Vec::new(),
        }
    }

    /// Set trigger keywords.
    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger_keywords = triggers.into_iter().map(Into::into).collect();
        self
    }

    /// Set interventions.
    pub fn with_interventions<I, S>(mut self, interventions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interventions = interventions.into_iter().map(Into::into).collect();
        self
    }
}

/// The on-disk knowledge base document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct KnowledgeBase {
    /// Document version
    #[serde(default = "default_version")]
    pub version: String,
    /// Free-text description of the document
    #[serde(default)]
    pub description: String,
    /// Principle records in catalog order
    pub principles: Vec<Principle>,
}

fn default_version() -> String {
    "1.0".to_string()
}
