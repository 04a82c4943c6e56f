//! Caller-side feedback ledger.
//!
//! Records whether interventions for a principle worked and keeps the
//! aggregate [`FeedbackStats`] the calibrator reads. The engine never writes
//! here; callers record outcomes after acting on a result and hand the
//! resulting snapshot back in through [`UserBehavioralContext`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::types::{FeedbackStats, UserBehavioralContext};

/// Effectiveness reported for principles without history.
pub const NEUTRAL_EFFECTIVENESS: f64 = 0.5;

/// One recorded intervention outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// Principle the intervention belonged to
    pub principle_id: String,
    /// Whether it helped
    pub success: bool,
    /// When the outcome was recorded
    pub recorded_at: DateTime<Utc>,
}

impl FeedbackEvent {
    /// Create an event stamped now.
    pub fn new(principle_id: impl Into<String>, success: bool) -> Self {
        Self {
            principle_id: principle_id.into(),
            success,
            recorded_at: Utc::now(),
        }
    }
}

/// Per-user accumulator of intervention outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackLedger {
    stats: HashMap<String, FeedbackStats>,
    #[serde(default)]
    events: Vec<FeedbackEvent>,
}

impl FeedbackLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome for a principle.
    pub fn record(&mut self, principle_id: impl Into<String>, success: bool) -> &FeedbackStats {
        self.record_event(FeedbackEvent::new(principle_id, success))
    }

    /// Record a prepared event.
    pub fn record_event(&mut self, event: FeedbackEvent) -> &FeedbackStats {
        let principle_id = event.principle_id.clone();
        let stats = self.stats.entry(principle_id.clone()).or_default();
        stats.record(event.success);

        debug!(
            principle_id = %principle_id,
            success = event.success,
            total = stats.total,
            success_rate = stats.success_rate,
            "Recorded intervention feedback"
        );

        self.events.push(event);
        &self.stats[&principle_id]
    }

    /// Aggregate stats for a principle.
    pub fn stats(&self, principle_id: &str) -> Option<&FeedbackStats> {
        self.stats.get(principle_id)
    }

    /// Success rate for a principle, neutral when nothing is recorded.
    pub fn effectiveness(&self, principle_id: &str) -> f64 {
        match self.stats.get(principle_id) {
            Some(stats) if stats.total > 0 => stats.success_rate,
            _ => NEUTRAL_EFFECTIVENESS,
        }
    }

    /// Outcomes recorded for a principle.
    pub fn usage_count(&self, principle_id: &str) -> u32 {
        self.stats.get(principle_id).map_or(0, |s| s.total)
    }

    /// Recorded events, oldest first.
    pub fn events(&self) -> &[FeedbackEvent] {
        &self.events
    }

    /// Copy of the aggregate stats, keyed by principle id.
    pub fn snapshot(&self) -> HashMap<String, FeedbackStats> {
        self.stats.clone()
    }

    /// Attach this ledger's stats to a detection context.
    pub fn apply_to(&self, context: UserBehavioralContext) -> UserBehavioralContext {
        self.stats
            .iter()
            .fold(context, |ctx, (id, stats)| ctx.with_feedback(id.clone(), stats.clone()))
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Load from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_updates_stats() {
        let mut ledger = FeedbackLedger::new();
        ledger.record("loss_aversion", true);
        ledger.record("loss_aversion", false);
        let stats = ledger.record("loss_aversion", true).clone();

        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.total, 3);
        assert!(stats.validate().is_ok());
        assert_eq!(ledger.usage_count("loss_aversion"), 3);
        assert_eq!(ledger.events().len(), 3);
    }

    #[test]
    fn test_effectiveness_defaults_to_neutral() {
        let mut ledger = FeedbackLedger::new();
        assert_eq!(ledger.effectiveness("habit_loops"), NEUTRAL_EFFECTIVENESS);
        assert_eq!(ledger.usage_count("habit_loops"), 0);

        ledger.record("habit_loops", true);
        assert_eq!(ledger.effectiveness("habit_loops"), 1.0);
    }

    #[test]
    fn test_json_roundtrip_matches_incremental() {
        let mut ledger = FeedbackLedger::new();
        let outcomes = [true, false, true, true, false, true, true];
        for success in outcomes {
            ledger.record("friction_increase", success);
        }
        ledger.record("micro_habits", false);

        let json = ledger.to_json().unwrap();
        let restored = FeedbackLedger::from_json(&json).unwrap();

        let original = ledger.stats("friction_increase").unwrap();
        let reloaded = restored.stats("friction_increase").unwrap();
        assert_eq!(reloaded, original);
        assert_eq!(reloaded.total, outcomes.len() as u32);
        assert_eq!(reloaded.successes, 5);
        assert_eq!(reloaded.failures, 2);
        assert!((reloaded.success_rate - 5.0 / 7.0).abs() < f64::EPSILON);
        assert_eq!(restored.events(), ledger.events());
        assert_eq!(restored.snapshot(), ledger.snapshot());
    }

    #[test]
    fn test_stats_only_json() {
        let json = r#"{"stats": {"loss_aversion": {"successes": 3, "failures": 1, "total": 4, "success_rate": 0.75}}}"#;
        let ledger = FeedbackLedger::from_json(json).unwrap();

        assert_eq!(ledger.usage_count("loss_aversion"), 4);
        assert_eq!(ledger.effectiveness("loss_aversion"), 0.75);
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn test_apply_to_context() {
        let mut ledger = FeedbackLedger::new();
        ledger.record("default_effect", true);
        ledger.record("default_effect", true);

        let context = ledger.apply_to(UserBehavioralContext::empty().with_struggles(1));

        assert_eq!(context.struggle_count, 1);
        assert_eq!(context.feedback_for("default_effect").unwrap().total, 2);
        assert!(context.validate().is_ok());
    }
}
