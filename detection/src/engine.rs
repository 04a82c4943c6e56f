//! Detection engine.
//!
//! Runs one classification per call: the LLM path first when configured,
//! keyword matching when the LLM path yields nothing usable, then history
//! calibration on whichever result was produced. The LLM is asked at most
//! once per call.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use coach_agent::OpenAiBackend;
use principles::PrincipleCatalog;

use crate::calibration::HistoryCalibrator;
use crate::classifier::{BackendClassifier, ClassifierUnavailable, LlmClassifier};
use crate::config::DetectionConfig;
use crate::keyword::KeywordClassifier;
use crate::types::{
    DetectionResult, DetectionSource, Result, UserBehavioralContext, CLARIFICATION_THRESHOLD,
};

/// Default bound on the LLM call.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(15);

/// Catalog interventions used when the model suggests none.
pub const LLM_BACKFILL_INTERVENTIONS: usize = 3;

/// Orchestrates LLM classification, keyword fallback and calibration.
///
/// Holds no per-user state; one engine can serve any number of concurrent
/// calls.
pub struct DetectionEngine {
    catalog: Arc<PrincipleCatalog>,
    keyword: KeywordClassifier,
    llm: Option<Arc<dyn LlmClassifier>>,
    llm_timeout: Duration,
    clarification_threshold: f64,
}

impl DetectionEngine {
    /// Create a keyword-only engine over the catalog.
    pub fn new(catalog: Arc<PrincipleCatalog>) -> Self {
        Self {
            keyword: KeywordClassifier::new(catalog.clone()),
            catalog,
            llm: None,
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            clarification_threshold: CLARIFICATION_THRESHOLD,
        }
    }

    /// Try an LLM classifier before keyword matching.
    pub fn with_llm(mut self, classifier: Arc<dyn LlmClassifier>) -> Self {
        self.llm = Some(classifier);
        self
    }

    /// Bound the LLM call.
    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    /// Set the clarification threshold reported to callers.
    pub fn with_clarification_threshold(mut self, threshold: f64) -> Self {
        self.clarification_threshold = threshold;
        self
    }

    /// Build an engine from configuration.
    ///
    /// Fails if the configuration is invalid or the knowledge base cannot be
    /// loaded.
    pub fn from_config(config: &DetectionConfig) -> Result<Self> {
        config.validate()?;

        let catalog = match &config.knowledge_base_path {
            Some(path) => PrincipleCatalog::load(path)?,
            None => PrincipleCatalog::builtin()?,
        };
        let catalog = Arc::new(catalog);

        let mut engine = Self::new(catalog.clone())
            .with_clarification_threshold(config.clarification_threshold);

        if config.llm.enabled {
            let backend = OpenAiBackend::new(
                config.llm.base_url.clone(),
                config.llm.model.clone(),
                config.llm.api_key(),
            );
            let mut classifier = BackendClassifier::new(Arc::new(backend), catalog)
                .with_temperature(config.llm.temperature);
            if let Some(max_tokens) = config.llm.max_tokens {
                classifier = classifier.with_max_tokens(max_tokens);
            }

            info!(model = %config.llm.model, base_url = %config.llm.base_url, "LLM classification enabled");
            engine = engine
                .with_llm(Arc::new(classifier))
                .with_llm_timeout(config.llm.timeout());
        }

        Ok(engine)
    }

    /// The catalog this engine classifies against.
    pub fn catalog(&self) -> &Arc<PrincipleCatalog> {
        &self.catalog
    }

    /// Whether an LLM classifier is configured.
    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// Threshold below which callers should ask a clarifying question.
    pub fn clarification_threshold(&self) -> f64 {
        self.clarification_threshold
    }

    /// Whether a result from this engine calls for clarification.
    pub fn needs_clarification(&self, result: &DetectionResult) -> bool {
        result.needs_clarification(self.clarification_threshold)
    }

    /// Classify user text against the catalog and calibrate the result.
    ///
    /// LLM failures of any kind fall back to keyword matching and are never
    /// returned; only an invalid context is an error.
    pub async fn detect(&self, text: &str, context: &UserBehavioralContext) -> Result<DetectionResult> {
        context.validate()?;

        let raw = match &self.llm {
            Some(llm) => match self.try_llm(llm.as_ref(), text, context).await {
                Ok(result) => result,
                Err(reason) => {
                    warn!(error = %reason, "LLM path abandoned, using keyword classifier");
                    self.keyword.classify(text, context)
                }
            },
            None => self.keyword.classify(text, context),
        };

        let result = HistoryCalibrator::calibrate(raw, context);

        info!(
            principle_id = result.principle_id().unwrap_or("none"),
            source = result.source().as_str(),
            confidence = result.confidence(),
            adjusted = result.adjusted_by_history(),
            "Detection complete"
        );

        Ok(result)
    }

    /// Ask the LLM once and validate its answer against the catalog.
    async fn try_llm(
        &self,
        llm: &dyn LlmClassifier,
        text: &str,
        context: &UserBehavioralContext,
    ) -> std::result::Result<DetectionResult, ClassifierUnavailable> {
        let answer = tokio::time::timeout(self.llm_timeout, llm.classify(text, context))
            .await
            .map_err(|_| ClassifierUnavailable::Timeout {
                timeout_ms: self.llm_timeout.as_millis() as u64,
            })?
            .ok_or(ClassifierUnavailable::NoResult)?;

        let principle = self
            .catalog
            .lookup(&answer.principle_id)
            .ok_or_else(|| ClassifierUnavailable::UnknownPrinciple(answer.principle_id.clone()))?;

        let interventions = if answer.interventions.is_empty() {
            debug!(principle_id = %principle.id, "Backfilling interventions from catalog");
            self.catalog.interventions(&principle.id, LLM_BACKFILL_INTERVENTIONS)
        } else {
            answer.interventions
        };

        Ok(DetectionResult::new(
            Some(principle.id.clone()),
            answer.reason,
            interventions,
            answer.matched_triggers,
            DetectionSource::Llm,
            answer.base_confidence,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassifierResult, DetectionError, FeedbackStats};
    use async_trait::async_trait;
    use coach_agent::MockBackend;
    use principles::ANALYSIS_TOOL_NAME;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    const FOOD_DELIVERY: &str = "I keep ordering food delivery every evening when stressed";

    /// Classifier returning a fixed answer after an optional delay.
    struct FixedClassifier {
        answer: Option<ClassifierResult>,
        delay: Option<Duration>,
        calls: AtomicU32,
    }

    impl FixedClassifier {
        fn new(answer: Option<ClassifierResult>) -> Self {
            Self {
                answer,
                delay: None,
                calls: AtomicU32::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClassifier for FixedClassifier {
        async fn classify(&self, _text: &str, _context: &UserBehavioralContext) -> Option<ClassifierResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.answer.clone()
        }
    }

    fn catalog() -> Arc<PrincipleCatalog> {
        Arc::new(PrincipleCatalog::builtin().unwrap())
    }

    #[tokio::test]
    async fn test_keyword_only_engine() {
        let engine = DetectionEngine::new(catalog());
        assert!(!engine.has_llm());

        let result = engine
            .detect(FOOD_DELIVERY, &UserBehavioralContext::empty())
            .await
            .unwrap();

        let id = result.principle_id().unwrap();
        assert!(id == "friction_increase" || id == "habit_loops");
        assert!(result.confidence() > 0.0 && result.confidence() <= 0.75);
        assert!(!result.matched_triggers().is_empty());
        assert_eq!(result.source(), DetectionSource::Keyword);
        assert!(!result.adjusted_by_history());
    }

    #[tokio::test]
    async fn test_llm_result_accepted() {
        let llm = Arc::new(FixedClassifier::new(Some(
            ClassifierResult::new("habit_loops", "Evening stress is the cue")
                .with_interventions(["Plan a different evening routine"])
                .with_triggers(["every evening", "stressed"]),
        )));
        let engine = DetectionEngine::new(catalog()).with_llm(llm.clone());

        let result = engine
            .detect(FOOD_DELIVERY, &UserBehavioralContext::empty())
            .await
            .unwrap();

        assert_eq!(result.principle_id(), Some("habit_loops"));
        assert_eq!(result.source(), DetectionSource::Llm);
        assert_eq!(result.confidence(), 0.85);
        assert_eq!(result.interventions(), ["Plan a different evening routine"]);
        assert!(!engine.needs_clarification(&result));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_principle_falls_back() {
        let llm = Arc::new(FixedClassifier::new(Some(ClassifierResult::new(
            "sunk_cost_fallacy",
            "made up",
        ))));
        let engine = DetectionEngine::new(catalog()).with_llm(llm.clone());

        let result = engine
            .detect(FOOD_DELIVERY, &UserBehavioralContext::empty())
            .await
            .unwrap();

        assert_eq!(result.source(), DetectionSource::Keyword);
        assert_ne!(result.principle_id(), Some("sunk_cost_fallacy"));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_interventions_backfilled() {
        let llm = Arc::new(FixedClassifier::new(Some(ClassifierResult::new(
            "friction_increase",
            "Ordering is too easy",
        ))));
        let catalog = catalog();
        let engine = DetectionEngine::new(catalog.clone()).with_llm(llm);

        let result = engine
            .detect(FOOD_DELIVERY, &UserBehavioralContext::empty())
            .await
            .unwrap();

        assert_eq!(result.source(), DetectionSource::Llm);
        assert_eq!(
            result.interventions(),
            catalog.interventions("friction_increase", LLM_BACKFILL_INTERVENTIONS).as_slice()
        );
        assert_eq!(result.interventions().len(), LLM_BACKFILL_INTERVENTIONS);
    }

    #[tokio::test]
    async fn test_no_answer_falls_back() {
        let llm = Arc::new(FixedClassifier::new(None));
        let engine = DetectionEngine::new(catalog()).with_llm(llm.clone());

        let result = engine
            .detect(FOOD_DELIVERY, &UserBehavioralContext::empty())
            .await
            .unwrap();

        assert_eq!(result.source(), DetectionSource::Keyword);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_falls_back_without_retry() {
        let llm = Arc::new(
            FixedClassifier::new(Some(ClassifierResult::new("habit_loops", "late")))
                .with_delay(Duration::from_millis(500)),
        );
        let engine = DetectionEngine::new(catalog())
            .with_llm(llm.clone())
            .with_llm_timeout(Duration::from_millis(20));

        let result = engine
            .detect(FOOD_DELIVERY, &UserBehavioralContext::empty())
            .await
            .unwrap();

        assert_eq!(result.source(), DetectionSource::Keyword);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_backend_without_tool_call_falls_back() {
        let backend = Arc::new(MockBackend::default().with_response("Sounds like habit loops."));
        let catalog = catalog();
        let classifier = BackendClassifier::new(backend.clone(), catalog.clone());
        let engine = DetectionEngine::new(catalog).with_llm(Arc::new(classifier));

        let result = engine
            .detect(FOOD_DELIVERY, &UserBehavioralContext::empty())
            .await
            .unwrap();

        assert_eq!(result.source(), DetectionSource::Keyword);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let backend = Arc::new(
            MockBackend::default()
                .with_tool_call(ANALYSIS_TOOL_NAME, json!({"principle_id": "habit_loops"}))
                .with_latency(Duration::from_millis(500)),
        );
        let catalog = catalog();
        let classifier = BackendClassifier::new(backend.clone(), catalog.clone());
        let engine = DetectionEngine::new(catalog)
            .with_llm(Arc::new(classifier))
            .with_llm_timeout(Duration::from_millis(20));

        let result = engine
            .detect(FOOD_DELIVERY, &UserBehavioralContext::empty())
            .await
            .unwrap();

        assert_eq!(result.source(), DetectionSource::Keyword);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_backend_tool_call_end_to_end() {
        let backend = Arc::new(MockBackend::default().with_tool_call(
            ANALYSIS_TOOL_NAME,
            json!({
                "principle_id": "friction_increase",
                "reason": "Delivery apps make ordering effortless",
                "intervention_suggestions": ["Delete the delivery app"],
                "triggers_matched": ["food delivery"],
            }),
        ));
        let catalog = catalog();
        let classifier = BackendClassifier::new(backend.clone(), catalog.clone());
        let engine = DetectionEngine::new(catalog).with_llm(Arc::new(classifier));

        let context = UserBehavioralContext::empty()
            .with_feedback("friction_increase", FeedbackStats::from_counts(0, 2));
        let result = engine.detect(FOOD_DELIVERY, &context).await.unwrap();

        assert_eq!(result.principle_id(), Some("friction_increase"));
        assert_eq!(result.source(), DetectionSource::Llm);
        // 0.85 - 0.2
        assert_eq!(result.confidence(), 0.65);
        assert!(result.adjusted_by_history());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_calibration_can_request_clarification() {
        let engine = DetectionEngine::new(catalog());
        let context = UserBehavioralContext::empty()
            .with_feedback("friction_increase", FeedbackStats::from_counts(0, 3))
            .with_feedback("habit_loops", FeedbackStats::from_counts(0, 3));

        let result = engine.detect(FOOD_DELIVERY, &context).await.unwrap();

        assert!(result.adjusted_by_history());
        assert!(result.confidence() >= 0.1);
        assert!(engine.needs_clarification(&result));
    }

    #[tokio::test]
    async fn test_generic_result_for_unmatched_text() {
        let engine = DetectionEngine::new(catalog());

        let result = engine
            .detect("hello", &UserBehavioralContext::empty())
            .await
            .unwrap();

        assert_eq!(result.principle_id(), None);
        assert_eq!(result.confidence(), 0.3);
        assert_eq!(result.interventions().len(), 3);
        assert!(!engine.needs_clarification(&result));
    }

    #[tokio::test]
    async fn test_invalid_context_rejected() {
        let llm = Arc::new(FixedClassifier::new(Some(ClassifierResult::new("habit_loops", "x"))));
        let engine = DetectionEngine::new(catalog()).with_llm(llm.clone());
        let context = UserBehavioralContext::empty().with_feedback(
            "habit_loops",
            FeedbackStats {
                successes: 2,
                failures: 2,
                total: 3,
                success_rate: 0.5,
            },
        );

        let err = engine.detect(FOOD_DELIVERY, &context).await.unwrap_err();

        assert!(matches!(err, DetectionError::InvalidContext(_)));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_overflowing_feedback_rejected() {
        let engine = DetectionEngine::new(catalog());
        let context = UserBehavioralContext::empty().with_feedback(
            "habit_loops",
            FeedbackStats {
                successes: u32::MAX,
                failures: 1,
                total: 0,
                success_rate: 0.5,
            },
        );

        let err = engine.detect("every evening", &context).await.unwrap_err();
        assert!(matches!(err, DetectionError::InvalidContext(_)));
    }

    #[tokio::test]
    async fn test_concurrent_detection_shares_engine() {
        let engine = Arc::new(DetectionEngine::new(catalog()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine
                        .detect(FOOD_DELIVERY, &UserBehavioralContext::empty())
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_from_config_builtin() {
        let engine = DetectionEngine::from_config(&DetectionConfig::default()).unwrap();

        assert!(!engine.has_llm());
        assert_eq!(engine.catalog().len(), 8);
        assert_eq!(engine.clarification_threshold(), CLARIFICATION_THRESHOLD);
    }

    #[test]
    fn test_from_config_missing_knowledge_base() {
        let config = DetectionConfig {
            knowledge_base_path: Some("/nonexistent/behaviour_principles.json".to_string()),
            ..DetectionConfig::default()
        };

        let err = DetectionEngine::from_config(&config).err().unwrap();
        assert!(matches!(err, DetectionError::Catalog(_)));
    }

    #[test]
    fn test_from_config_knowledge_base_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("principles.yaml");
        std::fs::write(
            &path,
            r#"
principles:
  - id: friction_increase
    name: Friction Increase
    description: Make unwanted spending harder
    trigger_keywords: [delivery]
    interventions: [Delete the delivery app]
"#,
        )
        .unwrap();

        let config = DetectionConfig {
            knowledge_base_path: Some(path.to_string_lossy().into_owned()),
            ..DetectionConfig::default()
        };
        let engine = DetectionEngine::from_config(&config).unwrap();

        assert_eq!(engine.catalog().len(), 1);
        assert!(engine.catalog().contains("friction_increase"));
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = DetectionConfig {
            clarification_threshold: -0.5,
            ..DetectionConfig::default()
        };

        let err = DetectionEngine::from_config(&config).err().unwrap();
        assert!(matches!(err, DetectionError::Config(_)));
    }

    #[tokio::test]
    async fn test_from_config_with_openai_backend() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {
                                "name": "analyse_behaviour",
                                "arguments": "{\"principle_id\":\"habit_loops\",\"reason\":\"Evenings are the cue\",\"intervention_suggestions\":[],\"triggers_matched\":[\"every evening\"]}"
                            }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = DetectionConfig::default();
        config.llm.enabled = true;
        config.llm.base_url = format!("{}/v1", server.uri());
        config.llm.api_key_env = None;

        let engine = DetectionEngine::from_config(&config).unwrap();
        assert!(engine.has_llm());

        let result = engine
            .detect(FOOD_DELIVERY, &UserBehavioralContext::empty())
            .await
            .unwrap();

        assert_eq!(result.principle_id(), Some("habit_loops"));
        assert_eq!(result.source(), DetectionSource::Llm);
        assert_eq!(result.interventions().len(), LLM_BACKFILL_INTERVENTIONS);
        assert_eq!(result.matched_triggers(), ["every evening"]);
    }

    #[test]
    fn test_unavailable_reasons_display() {
        let reason = ClassifierUnavailable::Timeout { timeout_ms: 20 };
        assert_eq!(reason.to_string(), "Classification timed out after 20ms");
    }
}
