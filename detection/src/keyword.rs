//! Deterministic keyword classifier.
//!
//! Matches the lower-cased user text against every principle's trigger
//! keywords by substring, adds context bonuses from the user's history, and
//! picks the highest-scoring principle. Needs no network access.

use std::sync::Arc;
use tracing::debug;

use principles::PrincipleCatalog;

use crate::scorer::ConfidenceScorer;
use crate::types::{DetectionResult, DetectionSource, UserBehavioralContext, MAX_INTERVENTIONS};

/// Confidence of the generic fallback result.
pub const GENERIC_CONFIDENCE: f64 = 0.3;

/// Principle boosted when the user has an active streak to protect.
pub const STREAK_BONUS_PRINCIPLE: &str = "loss_aversion";

/// Principle boosted when the user keeps struggling.
pub const STRUGGLE_BONUS_PRINCIPLE: &str = "commitment_devices";

/// Struggles needed before the commitment bonus applies.
pub const STRUGGLE_BONUS_MIN: u32 = 2;

/// Matched keywords quoted in a reason before summarising the rest.
const REASON_KEYWORD_LIMIT: usize = 3;

const GENERIC_INTERVENTIONS: [&str; 3] = [
    "Write down what happened just before the spending, so we can spot the pattern together",
    "Pick one small, specific money habit to focus on this week",
    "Check in daily for the next few days and note how each decision felt",
];

const UNKNOWN_PRINCIPLE_INTERVENTIONS: [&str; 2] = [
    "Reflect on what triggered this behaviour and when it usually happens",
    "Set one small, concrete goal you can act on today",
];

/// Per-principle tally built while scoring.
#[derive(Debug, Clone)]
struct ScoreEntry {
    principle_id: String,
    matched: Vec<String>,
    bonus_points: u32,
}

impl ScoreEntry {
    fn new(principle_id: impl Into<String>) -> Self {
        Self {
            principle_id: principle_id.into(),
            matched: Vec::new(),
            bonus_points: 0,
        }
    }

    fn score(&self) -> usize {
        self.matched.len() + self.bonus_points as usize
    }
}

/// Keyword-based principle classifier over a shared catalog.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    catalog: Arc<PrincipleCatalog>,
}

impl KeywordClassifier {
    /// Create a classifier over the catalog.
    pub fn new(catalog: Arc<PrincipleCatalog>) -> Self {
        Self { catalog }
    }

    /// Classify user text. Never fails; empty text yields the generic result
    /// unless the context bonuses alone select a principle.
    pub fn classify(&self, text: &str, context: &UserBehavioralContext) -> DetectionResult {
        let entries = self.score_entries(text, context);

        // First entry reaching the maximum wins, so catalog order breaks ties.
        let mut winner: Option<&ScoreEntry> = None;
        for entry in &entries {
            if entry.score() > winner.map_or(0, ScoreEntry::score) {
                winner = Some(entry);
            }
        }

        let Some(winner) = winner else {
            debug!("No keyword matches or context bonuses; using generic result");
            return Self::generic_result();
        };

        debug!(
            principle_id = %winner.principle_id,
            score = winner.score(),
            keywords = winner.matched.len(),
            bonus_points = winner.bonus_points,
            "Keyword classification selected principle"
        );

        self.build_result(winner)
    }

    /// Score every catalog principle, then apply context bonuses.
    ///
    /// Bonus principles missing from the catalog are appended after the
    /// catalog entries.
    fn score_entries(&self, text: &str, context: &UserBehavioralContext) -> Vec<ScoreEntry> {
        let lowered = text.to_ascii_lowercase();

        let mut entries: Vec<ScoreEntry> = self
            .catalog
            .all()
            .iter()
            .map(|principle| {
                let mut entry = ScoreEntry::new(&principle.id);
                entry.matched = principle
                    .trigger_keywords
                    .iter()
                    .filter(|keyword| {
                        let keyword = keyword.to_ascii_lowercase();
                        !keyword.is_empty() && lowered.contains(&keyword)
                    })
                    .cloned()
                    .collect();
                entry
            })
            .collect();

        if context.active_streak_count > 0 {
            Self::add_bonus(&mut entries, STREAK_BONUS_PRINCIPLE);
        }
        if context.struggle_count >= STRUGGLE_BONUS_MIN {
            Self::add_bonus(&mut entries, STRUGGLE_BONUS_PRINCIPLE);
        }

        entries
    }

    fn add_bonus(entries: &mut Vec<ScoreEntry>, principle_id: &str) {
        match entries.iter_mut().find(|e| e.principle_id == principle_id) {
            Some(entry) => entry.bonus_points += 1,
            None => {
                let mut entry = ScoreEntry::new(principle_id);
                entry.bonus_points = 1;
                entries.push(entry);
            }
        }
    }

    fn build_result(&self, winner: &ScoreEntry) -> DetectionResult {
        let Some(principle) = self.catalog.lookup(&winner.principle_id) else {
            // A context bonus selected a principle this catalog does not define.
            let confidence = ConfidenceScorer::score(winner.matched.len(), 0, winner.bonus_points);
            return DetectionResult::new(
                Some(winner.principle_id.clone()),
                format!(
                    "Your recent history points to the '{}' pattern.",
                    winner.principle_id
                ),
                UNKNOWN_PRINCIPLE_INTERVENTIONS.iter().map(|s| s.to_string()).collect(),
                winner.matched.clone(),
                DetectionSource::Keyword,
                confidence,
            );
        };

        let confidence = ConfidenceScorer::score(
            winner.matched.len(),
            principle.trigger_keywords.len(),
            winner.bonus_points,
        );

        let reason = if winner.matched.is_empty() {
            format!(
                "Based on your history, your situation relates to {}.",
                principle.name
            )
        } else {
            let quoted: Vec<String> = winner
                .matched
                .iter()
                .take(REASON_KEYWORD_LIMIT)
                .map(|k| format!("'{}'", k))
                .collect();
            let mut reason = format!(
                "Detected {} from keywords: {}",
                principle.name,
                quoted.join(", ")
            );
            if winner.matched.len() > REASON_KEYWORD_LIMIT {
                reason.push_str(&format!(
                    " (and {} more)",
                    winner.matched.len() - REASON_KEYWORD_LIMIT
                ));
            }
            reason
        };

        DetectionResult::new(
            Some(principle.id.clone()),
            reason,
            principle.interventions.iter().take(MAX_INTERVENTIONS).cloned().collect(),
            winner.matched.clone(),
            DetectionSource::Keyword,
            confidence,
        )
    }

    /// The null-principle result used when nothing matched.
    pub fn generic_result() -> DetectionResult {
        DetectionResult::new(
            None,
            "No specific behavioural pattern stood out yet; starting with general habit-building steps.",
            GENERIC_INTERVENTIONS.iter().map(|s| s.to_string()).collect(),
            Vec::new(),
            DetectionSource::Keyword,
            GENERIC_CONFIDENCE,
        )
    }
}
