//! Behavioural Principle Detection Engine
//!
//! Maps free-text descriptions of a user's financial behaviour to one of the
//! catalog's behavioural principles and returns ranked interventions:
//!
//! - **LLM path**: an optional classifier that picks a principle through the
//!   `analyse_behaviour` tool call
//! - **Keyword fallback**: deterministic trigger matching with context bonuses
//! - **History calibration**: confidence shifted by the user's past outcomes
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    DetectionEngine                       │
//! │                                                          │
//! │  ┌──────────────┐  none  ┌──────────────────┐            │
//! │  │ LlmClassifier│───────▶│ KeywordClassifier│            │
//! │  └──────┬───────┘        └────────┬─────────┘            │
//! │         │                         │                      │
//! │         └──────────┬──────────────┘                      │
//! │            ┌───────▼──────────┐                          │
//! │            │ HistoryCalibrator│                          │
//! │            └──────────────────┘                          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use detection::{DetectionConfig, DetectionEngine, UserBehavioralContext};
//!
//! let engine = DetectionEngine::from_config(&DetectionConfig::default())?;
//! let result = engine
//!     .detect("I keep ordering food delivery", &UserBehavioralContext::empty())
//!     .await?;
//!
//! if engine.needs_clarification(&result) {
//!     // ask a follow-up question
//! }
//! ```

pub mod calibration;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod feedback;
pub mod keyword;
pub mod scorer;
pub mod types;

// Re-export main types
pub use calibration::HistoryCalibrator;
pub use classifier::{BackendClassifier, ClassifierUnavailable, LlmClassifier};
pub use config::{DetectionConfig, LlmConfig};
pub use engine::DetectionEngine;
pub use feedback::{FeedbackEvent, FeedbackLedger};
pub use keyword::KeywordClassifier;
pub use scorer::ConfidenceScorer;
pub use types::*;
