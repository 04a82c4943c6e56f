//! LLM classification boundary.
//!
//! The engine only sees [`LlmClassifier`], which yields an already
//! structured [`ClassifierResult`] or nothing. [`BackendClassifier`] is the
//! implementation that drives an [`LlmBackend`] through the
//! `analyse_behaviour` tool call.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use coach_agent::{CompletionRequest, LlmBackend, LlmError, ToolDefinition};
use principles::{PrincipleCatalog, PromptAssembler, ANALYSIS_TOOL_NAME};

use crate::types::{ClassifierResult, UserBehavioralContext};

/// Default sampling temperature for classification.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Most interventions accepted from the model.
pub const MAX_LLM_INTERVENTIONS: usize = 3;

/// Reasons the LLM path produced no usable answer.
///
/// Always absorbed by the engine, which falls back to keyword matching.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierUnavailable {
    /// The backend call failed
    #[error("Backend error: {0}")]
    Backend(#[from] LlmError),

    /// The call did not finish in time
    #[error("Classification timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The model answered without calling the analysis tool
    #[error("Model did not call the analysis tool")]
    NoToolCall,

    /// The tool call arguments could not be decoded
    #[error("Malformed tool call: {0}")]
    MalformedToolCall(String),

    /// The model chose a principle the catalog does not define
    #[error("Unknown principle: {0}")]
    UnknownPrinciple(String),

    /// The backend cannot make tool calls
    #[error("Backend {0} does not support tool calling")]
    ToolsUnsupported(String),

    /// The classifier returned no result
    #[error("Classifier returned no result")]
    NoResult,
}

/// A classifier that asks a language model to pick a principle.
#[async_trait]
pub trait LlmClassifier: Send + Sync {
    /// Classify user text, or return `None` when no answer is available.
    async fn classify(&self, text: &str, context: &UserBehavioralContext) -> Option<ClassifierResult>;
}

/// Arguments of an `analyse_behaviour` tool call.
#[derive(Debug, Deserialize)]
struct AnalysisArguments {
    principle_id: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    intervention_suggestions: Vec<String>,
    #[serde(default)]
    triggers_matched: Vec<String>,
}

/// [`LlmClassifier`] backed by any [`LlmBackend`] with tool calling.
pub struct BackendClassifier {
    backend: Arc<dyn LlmBackend>,
    catalog: Arc<PrincipleCatalog>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl BackendClassifier {
    /// Create a classifier over a backend and the catalog it may choose from.
    pub fn new(backend: Arc<dyn LlmBackend>, catalog: Arc<PrincipleCatalog>) -> Self {
        Self {
            backend,
            catalog,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap the completion length.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Summarise the user's history for the prompt.
    pub fn memory_context(context: &UserBehavioralContext) -> String {
        let mut parts = Vec::new();

        if context.total_streak_count > 0 {
            parts.push(format!(
                "Streaks: {}/{} active",
                context.active_streak_count, context.total_streak_count
            ));
        }
        if context.struggle_count > 0 {
            parts.push(format!("Recorded struggles: {}", context.struggle_count));
        }

        if parts.is_empty() {
            "No prior context available".to_string()
        } else {
            parts.join("\n")
        }
    }

    /// Build the completion request for one classification.
    pub fn build_request(&self, text: &str, context: &UserBehavioralContext) -> CompletionRequest {
        let tool = ToolDefinition::new(
            ANALYSIS_TOOL_NAME,
            PromptAssembler::tool_description(),
            PromptAssembler::tool_parameters(&self.catalog),
        );

        let mut request = CompletionRequest::user(PromptAssembler::build_analysis_prompt(
            text,
            &Self::memory_context(context),
        ))
        .with_system(PromptAssembler::build_system_prompt())
        .with_temperature(self.temperature)
        .with_tool(tool)
        .with_tool_choice(ANALYSIS_TOOL_NAME);

        if let Some(max_tokens) = self.max_tokens {
            let cap = self.backend.capabilities().max_output_tokens;
            request = request.with_max_tokens(max_tokens.min(cap));
        }
        request
    }

    /// Run one classification, reporting why it failed.
    pub async fn try_classify(
        &self,
        text: &str,
        context: &UserBehavioralContext,
    ) -> Result<ClassifierResult, ClassifierUnavailable> {
        if !self.backend.capabilities().supports_function_calling {
            return Err(ClassifierUnavailable::ToolsUnsupported(
                self.backend.id().to_string(),
            ));
        }

        let request = self.build_request(text, context);

        debug!(backend = %self.backend.id(), "Requesting behaviour analysis");
        let response = self.backend.complete(request).await?;

        let call = response
            .tool_call(ANALYSIS_TOOL_NAME)
            .ok_or(ClassifierUnavailable::NoToolCall)?;

        let mut args: AnalysisArguments = serde_json::from_value(call.arguments.clone())
            .map_err(|e| ClassifierUnavailable::MalformedToolCall(e.to_string()))?;

        if args.principle_id.trim().is_empty() {
            return Err(ClassifierUnavailable::MalformedToolCall(
                "empty principle_id".to_string(),
            ));
        }

        args.intervention_suggestions.truncate(MAX_LLM_INTERVENTIONS);

        debug!(
            principle_id = %args.principle_id,
            interventions = args.intervention_suggestions.len(),
            triggers = args.triggers_matched.len(),
            tokens = response.usage.total(),
            "Behaviour analysis returned"
        );

        Ok(ClassifierResult::new(args.principle_id, args.reason)
            .with_interventions(args.intervention_suggestions)
            .with_triggers(args.triggers_matched))
    }
}

#[async_trait]
impl LlmClassifier for BackendClassifier {
    async fn classify(&self, text: &str, context: &UserBehavioralContext) -> Option<ClassifierResult> {
        match self.try_classify(text, context).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(backend = %self.backend.id(), error = %e, "LLM classification unavailable");
                None
            }
        }
    }
}
