//! Behavioural Principle Knowledge Base for HabitLedger
//!
//! This crate holds the named behavioural-science principles the coach can
//! detect (loss aversion, habit loops, friction increase, ...), each with
//! trigger keywords and ranked interventions.
//!
//! # Key Components
//!
//! - [`PrincipleCatalog`]: Load-once, read-many index over the knowledge base
//! - [`Principle`]: A single principle record
//! - [`PromptAssembler`]: Builds the LLM prompt and `analyse_behaviour` tool schema
//!
//! # Example
//!
//! ```ignore
//! use principles::PrincipleCatalog;
//!
//! let catalog = PrincipleCatalog::load("data/behaviour_principles.json")?;
//! let principle = catalog.lookup("friction_increase");
//! ```

pub mod catalog;
pub mod prompt;
pub mod types;

// Re-export main types
pub use catalog::{CatalogLoadError, PrincipleCatalog, SourceFormat};
pub use prompt::{PromptAssembler, ANALYSIS_TOOL_NAME};
pub use types::*;
