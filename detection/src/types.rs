//! Core types for the detection engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Confidence below which a detected principle should prompt a clarifying question.
pub const CLARIFICATION_THRESHOLD: f64 = 0.6;

/// Base confidence of an accepted LLM classification.
pub const LLM_BASE_CONFIDENCE: f64 = 0.85;

/// Maximum interventions carried on a result.
pub const MAX_INTERVENTIONS: usize = 5;

/// Tolerance when checking a stored success rate against its counts.
const SUCCESS_RATE_TOLERANCE: f64 = 0.01;

/// Aggregate outcome history for one principle and one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct FeedbackStats {
    /// Interventions that worked
    pub successes: u32,
    /// Interventions that did not work
    pub failures: u32,
    /// `successes + failures`
    pub total: u32,
    /// `successes / total`, meaningless while `total == 0`
    pub success_rate: f64,
}

impl FeedbackStats {
    /// Build stats from raw counts.
    pub fn from_counts(successes: u32, failures: u32) -> Self {
        let mut stats = Self {
            successes,
            failures,
            ..Default::default()
        };
        stats.refresh();
        stats
    }

    /// Record one intervention outcome.
    pub fn record(&mut self, success: bool) {
        if success {
            self.successes = self.successes.saturating_add(1);
        } else {
            self.failures = self.failures.saturating_add(1);
        }
        self.refresh();
    }

    fn refresh(&mut self) {
        self.total = self.successes.saturating_add(self.failures);
        self.success_rate = if self.total > 0 {
            self.successes as f64 / self.total as f64
        } else {
            0.0
        };
    }

    /// Check the count and rate invariants.
    pub fn validate(&self) -> Result<()> {
        let sum = self.successes.checked_add(self.failures).ok_or_else(|| {
            DetectionError::InvalidContext(format!(
                "successes {} + failures {} overflows",
                self.successes, self.failures
            ))
        })?;
        if self.total != sum {
            return Err(DetectionError::InvalidContext(format!(
                "total {} != successes {} + failures {}",
                self.total, self.successes, self.failures
            )));
        }
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(DetectionError::InvalidContext(format!(
                "success rate {} outside [0, 1]",
                self.success_rate
            )));
        }
        if self.total > 0 {
            let expected = self.successes as f64 / self.total as f64;
            if (expected - self.success_rate).abs() > SUCCESS_RATE_TOLERANCE {
                return Err(DetectionError::InvalidContext(format!(
                    "success rate {} does not match {}/{}",
                    self.success_rate, self.successes, self.total
                )));
            }
        }
        Ok(())
    }
}

/// The slice of a user's memory that detection reads.
///
/// Owned by the caller; the engine never mutates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct UserBehavioralContext {
    /// Streaks with a current count above zero
    pub active_streak_count: u32,
    /// Total streaks tracked, active or not
    #[serde(default)]
    pub total_streak_count: u32,
    /// Recorded struggles
    pub struggle_count: u32,
    /// Outcome history per principle id
    #[serde(default)]
    pub intervention_feedback: HashMap<String, FeedbackStats>,
}

impl UserBehavioralContext {
    /// A user with no history.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set active streaks (also raises the total if needed).
    pub fn with_active_streaks(mut self, count: u32) -> Self {
        self.active_streak_count = count;
        self.total_streak_count = self.total_streak_count.max(count);
        self
    }

    /// Set total tracked streaks.
    pub fn with_total_streaks(mut self, count: u32) -> Self {
        self.total_streak_count = count.max(self.active_streak_count);
        self
    }

    /// Set recorded struggles.
    pub fn with_struggles(mut self, count: u32) -> Self {
        self.struggle_count = count;
        self
    }

    /// Attach outcome history for a principle.
    pub fn with_feedback(mut self, principle_id: impl Into<String>, stats: FeedbackStats) -> Self {
        self.intervention_feedback.insert(principle_id.into(), stats);
        self
    }

    /// Outcome history for a principle.
    pub fn feedback_for(&self, principle_id: &str) -> Option<&FeedbackStats> {
        self.intervention_feedback.get(principle_id)
    }

    /// Check every feedback entry's invariants.
    pub fn validate(&self) -> Result<()> {
        if self.active_streak_count > self.total_streak_count && self.total_streak_count > 0 {
            return Err(DetectionError::InvalidContext(format!(
                "{} active streaks but only {} tracked",
                self.active_streak_count, self.total_streak_count
            )));
        }

        for (principle_id, stats) in &self.intervention_feedback {
            stats.validate().map_err(|e| match e {
                DetectionError::InvalidContext(reason) => DetectionError::InvalidContext(format!(
                    "feedback for {}: {}",
                    principle_id, reason
                )),
                other => other,
            })?;
        }
        Ok(())
    }
}

/// Which classification path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Llm,
    Keyword,
}

impl DetectionSource {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::Llm => "llm",
            DetectionSource::Keyword => "keyword",
        }
    }
}

/// Outcome of classifying one piece of user text.
///
/// Built through [`DetectionResult::new`], which enforces the intervention
/// limit and the confidence range.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct DetectionResult {
    principle_id: Option<String>,
    reason: String,
    interventions: Vec<String>,
    matched_triggers: Vec<String>,
    source: DetectionSource,
    confidence: f64,
    adjusted_by_history: bool,
}

impl DetectionResult {
    /// Create a result. Interventions beyond [`MAX_INTERVENTIONS`] are dropped and
    /// confidence is clamped to `[0, 1]`.
    pub fn new(
        principle_id: Option<String>,
        reason: impl Into<String>,
        mut interventions: Vec<String>,
        matched_triggers: Vec<String>,
        source: DetectionSource,
        confidence: f64,
    ) -> Self {
        interventions.truncate(MAX_INTERVENTIONS);
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };

        Self {
            principle_id,
            reason: reason.into(),
            interventions,
            matched_triggers,
            source,
            confidence,
            adjusted_by_history: false,
        }
    }

    /// Detected principle, `None` for the generic fallback.
    pub fn principle_id(&self) -> Option<&str> {
        self.principle_id.as_deref()
    }

    /// Why this principle was chosen.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Suggested interventions, best first.
    pub fn interventions(&self) -> &[String] {
        &self.interventions
    }

    /// Trigger phrases that supported the detection.
    pub fn matched_triggers(&self) -> &[String] {
        &self.matched_triggers
    }

    /// Which path produced the result.
    pub fn source(&self) -> DetectionSource {
        self.source
    }

    /// Confidence in `[0, 1]`.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Whether history calibration changed the confidence.
    pub fn adjusted_by_history(&self) -> bool {
        self.adjusted_by_history
    }

    /// Whether the caller should ask a clarifying question instead of
    /// presenting interventions. Only applies when a principle was detected.
    pub fn needs_clarification(&self, threshold: f64) -> bool {
        self.principle_id.is_some() && self.confidence < threshold
    }

    /// Replace the confidence after history calibration.
    pub(crate) fn into_calibrated(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self.adjusted_by_history = true;
        self
    }
}

/// Structured answer from the LLM classification path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResult {
    /// Principle id chosen by the model (not yet checked against the catalog)
    pub principle_id: String,
    /// Model's explanation
    pub reason: String,
    /// 0-3 interventions suggested by the model
    pub interventions: Vec<String>,
    /// Phrases the model cited
    pub matched_triggers: Vec<String>,
    /// Confidence assigned to an accepted LLM answer
    pub base_confidence: f64,
}

impl ClassifierResult {
    /// Create a result with the standard LLM base confidence.
    pub fn new(principle_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            principle_id: principle_id.into(),
            reason: reason.into(),
            interventions: Vec::new(),
            matched_triggers: Vec::new(),
            base_confidence: LLM_BASE_CONFIDENCE,
        }
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

    /// Set matched triggers.
    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matched_triggers = triggers.into_iter().map(Into::into).collect();
        self
    }
}

/// Error types for detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// Caller passed a context that breaks its invariants
    #[error("Invalid context: {0}")]
    InvalidContext(String),

    /// Knowledge base could not be loaded
    #[error("Catalog error: {0}")]
    Catalog(#[from] principles::CatalogLoadError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for detection operations.
pub type Result<T> = std::result::Result<T, DetectionError>;
