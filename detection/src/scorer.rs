//! Confidence scoring for keyword matches.
//!
//! Keyword confidence never exceeds [`KEYWORD_CONFIDENCE_CEILING`], which
//! sits below [`LLM_BASE_CONFIDENCE`](crate::LLM_BASE_CONFIDENCE).

/// Highest confidence the keyword path can produce.
pub const KEYWORD_CONFIDENCE_CEILING: f64 = 0.75;

/// Weight of the keyword match ratio.
const KEYWORD_WEIGHT: f64 = 0.8;

/// Confidence added per context bonus point.
const MEMORY_BONUS_PER_POINT: f64 = 0.1;

/// Cap on the total context bonus.
const MEMORY_BONUS_CAP: f64 = 0.2;

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pure confidence function for keyword classification.
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    /// Score a keyword match.
    ///
    /// - `matched`: keywords of the principle found in the text
    /// - `total_for_principle`: keywords the principle defines
    /// - `memory_bonus_count`: context bonuses that applied to this principle
    pub fn score(matched: usize, total_for_principle: usize, memory_bonus_count: u32) -> f64 {
        let keyword_confidence = if total_for_principle == 0 {
            0.0
        } else {
            (matched as f64 / total_for_principle as f64).min(1.0)
        };

        let memory_bonus = (memory_bonus_count as f64 * MEMORY_BONUS_PER_POINT).min(MEMORY_BONUS_CAP);
        let raw = (keyword_confidence * KEYWORD_WEIGHT + memory_bonus).min(1.0);

        round2(raw.min(KEYWORD_CONFIDENCE_CEILING))
    }
}
