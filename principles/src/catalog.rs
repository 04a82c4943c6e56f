//! The principle catalog: a read-only index over the knowledge base.
//!
//! The catalog is loaded once and shared immutably (typically behind an
//! `Arc`) by every classification call. Iteration order is the order of the
//! source document, which keyword scoring relies on for its tie-break.

use std::collections::HashMap;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::types::{KnowledgeBase, Principle};

/// Knowledge base bundled with the crate.
const BUILTIN_KNOWLEDGE_BASE: &str = include_str!("../data/behaviour_principles.json");

/// Error types for loading a principle catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    /// Source file does not exist
    #[error("Knowledge base not found: {path}")]
    NotFound { path: String },

    /// Source file could not be read
    #[error("Failed to read knowledge base {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Source is not parseable into the principle shape
    #[error("Malformed knowledge base: {0}")]
    Malformed(String),

    /// Two records share an id
    #[error("Duplicate principle id: {0}")]
    DuplicatePrinciple(String),

    /// A record is missing required fields
    #[error("Invalid principle: {0}")]
    InvalidPrinciple(String),
}

/// Source format of a knowledge base document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Yaml,
}

impl SourceFormat {
    /// Guess the format from a file extension. Anything not YAML is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Read-only mapping from principle id to [`Principle`], in document order.
#[derive(Debug, Clone)]
pub struct PrincipleCatalog {
    version: String,
    principles: Vec<Principle>,
    index: HashMap<String, usize>,
    fingerprint: String,
}

impl PrincipleCatalog {
    /// Load a catalog from a JSON or YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogLoadError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        if !path.exists() {
            return Err(CatalogLoadError::NotFound { path: display });
        }

        let content = std::fs::read_to_string(path).map_err(|source| CatalogLoadError::Io {
            path: display.clone(),
            source,
        })?;

        let catalog = Self::parse(&content, SourceFormat::from_path(path))?;

        let path_str = display.as_str();
        info!(
            path = %path_str,
            principles = catalog.len(),
            fingerprint = %catalog.fingerprint(),
            "Loaded principle catalog"
        );

        Ok(catalog)
    }

    /// Parse a catalog from document text.
    pub fn parse(content: &str, format: SourceFormat) -> Result<Self, CatalogLoadError> {
        let document: KnowledgeBase = match format {
            SourceFormat::Json => serde_json::from_str(content)
                .map_err(|e| CatalogLoadError::Malformed(e.to_string()))?,
            SourceFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| CatalogLoadError::Malformed(e.to_string()))?,
        };

        Self::from_document(document)
    }

    /// Parse a catalog from a JSON document.
    pub fn from_json_str(content: &str) -> Result<Self, CatalogLoadError> {
        Self::parse(content, SourceFormat::Json)
    }

    /// Parse a catalog from a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self, CatalogLoadError> {
        Self::parse(content, SourceFormat::Yaml)
    }

    /// The knowledge base bundled with this crate.
    pub fn builtin() -> Result<Self, CatalogLoadError> {
        Self::from_json_str(BUILTIN_KNOWLEDGE_BASE)
    }

    /// Build a catalog from an already-parsed document.
    pub fn from_document(document: KnowledgeBase) -> Result<Self, CatalogLoadError> {
        Self::build(document.version, document.principles)
    }

    /// Build a catalog from principles in the given order.
    pub fn from_principles(
        principles: impl IntoIterator<Item = Principle>,
    ) -> Result<Self, CatalogLoadError> {
        Self::build("1.0".to_string(), principles.into_iter().collect())
    }

    fn build(version: String, principles: Vec<Principle>) -> Result<Self, CatalogLoadError> {
        let mut index = HashMap::with_capacity(principles.len());

        for (position, principle) in principles.iter().enumerate() {
            if principle.id.trim().is_empty() {
                return Err(CatalogLoadError::InvalidPrinciple(format!(
                    "record {} has an empty id",
                    position
                )));
            }
            if principle.name.trim().is_empty() {
                return Err(CatalogLoadError::InvalidPrinciple(format!(
                    "{} has an empty name",
                    principle.id
                )));
            }
            if index.insert(principle.id.clone(), position).is_some() {
                return Err(CatalogLoadError::DuplicatePrinciple(principle.id.clone()));
            }
        }

        let fingerprint = Self::compute_fingerprint(&principles);
        debug!(principles = principles.len(), %fingerprint, "Built principle catalog");

        Ok(Self {
            version,
            principles,
            index,
            fingerprint,
        })
    }

    /// Look up a principle by id.
    pub fn lookup(&self, id: &str) -> Option<&Principle> {
        self.index.get(id).map(|&i| &self.principles[i])
    }

    /// Whether a principle id is known.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All principles in document order.
    pub fn all(&self) -> &[Principle] {
        &self.principles
    }

    /// Principle ids in document order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.principles.iter().map(|p| p.id.as_str())
    }

    /// Number of principles.
    pub fn len(&self) -> usize {
        self.principles.len()
    }

    /// Whether the catalog has no principles.
    pub fn is_empty(&self) -> bool {
        self.principles.is_empty()
    }

    /// Knowledge base document version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The first `limit` interventions for a principle; empty for unknown ids.
    pub fn interventions(&self, id: &str, limit: usize) -> Vec<String> {
        self.lookup(id)
            .map(|p| p.interventions.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// A short explanation of a principle suitable for showing to a user.
    pub fn explain(&self, id: &str) -> String {
        match self.lookup(id) {
            Some(p) => format!("{}: {}", p.name, p.description),
            None => "This draws on general behavioural science: small, consistent changes \
                     to your environment and routines make new money habits stick."
                .to_string(),
        }
    }

    /// Deterministic SHA-256 fingerprint of the catalog content.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn compute_fingerprint(principles: &[Principle]) -> String {
        let mut hasher = Sha256::new();

        for principle in principles {
            hasher.update(principle.id.as_bytes());
            hasher.update([0u8]);
            for keyword in &principle.trigger_keywords {
                hasher.update(keyword.as_bytes());
                hasher.update([0u8]);
            }
            for intervention in &principle.interventions {
                hasher.update(intervention.as_bytes());
                hasher.update([0u8]);
            }
            hasher.update([1u8]);
        }

        hex::encode(hasher.finalize())
    }
}
