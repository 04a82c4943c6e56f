//! History calibration.
//!
//! Shifts a classification's confidence by how well interventions for the
//! detected principle have worked for this user before. Applied to LLM and
//! keyword results alike.

use tracing::debug;

use crate::scorer::round2;
use crate::types::{DetectionResult, UserBehavioralContext};

/// Confidence assumed when the incoming result carries none.
pub const DEFAULT_CONFIDENCE: f64 = 0.7;

/// Lowest confidence calibration can produce.
pub const CALIBRATED_FLOOR: f64 = 0.1;

/// Outcomes needed before history is trusted.
pub const MIN_FEEDBACK_SAMPLES: u32 = 2;

/// Scale applied to the success rate's distance from 0.5.
const ADJUSTMENT_SCALE: f64 = 0.4;

/// Confidence calibrator driven by per-principle feedback.
pub struct HistoryCalibrator;

impl HistoryCalibrator {
    /// Calibrate a raw confidence value.
    ///
    /// Returns the new confidence and whether history changed it. Without a
    /// principle, without feedback, or with fewer than
    /// [`MIN_FEEDBACK_SAMPLES`] outcomes the confidence is passed through.
    pub fn calibrate_confidence(
        principle_id: Option<&str>,
        confidence: Option<f64>,
        context: &UserBehavioralContext,
    ) -> (f64, bool) {
        let current = confidence.unwrap_or(DEFAULT_CONFIDENCE);

        let Some(principle_id) = principle_id else {
            return (current, false);
        };
        let Some(stats) = context.feedback_for(principle_id) else {
            return (current, false);
        };
        if stats.total < MIN_FEEDBACK_SAMPLES {
            return (current, false);
        }

        let adjustment = (stats.success_rate - 0.5) * ADJUSTMENT_SCALE;
        let calibrated = round2((current + adjustment).clamp(CALIBRATED_FLOOR, 1.0));

        debug!(
            principle_id,
            success_rate = stats.success_rate,
            samples = stats.total,
            from = current,
            to = calibrated,
            "Calibrated confidence from history"
        );

        (calibrated, true)
    }

    /// Calibrate a detection result against the user's history.
    pub fn calibrate(result: DetectionResult, context: &UserBehavioralContext) -> DetectionResult {
        let (confidence, adjusted) =
            Self::calibrate_confidence(result.principle_id(), Some(result.confidence()), context);

        if adjusted {
            result.into_calibrated(confidence)
        } else {
            result
        }
    }
}
