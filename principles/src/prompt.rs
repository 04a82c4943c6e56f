//! Prompt assembly from the principle catalog.
//!
//! Builds the system prompt and the `analyse_behaviour` tool schema that let
//! an LLM pick a principle through a structured tool call.

use serde_json::json;

use crate::catalog::PrincipleCatalog;

/// Name of the tool the model is asked to call.
pub const ANALYSIS_TOOL_NAME: &str = "analyse_behaviour";

/// Assembles prompts and tool schemas from the catalog.
pub struct PromptAssembler;

impl PromptAssembler {
    /// One line per principle: `- id: Name - description`.
    pub fn principle_listing(catalog: &PrincipleCatalog) -> String {
        catalog
            .all()
            .iter()
            .map(|p| format!("- {}: {} - {}", p.id, p.name, p.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Description shown to the model for the analysis tool.
    pub fn tool_description() -> &'static str {
        "Analyse the user's financial behaviour and identify the most relevant \
         behavioural science principle. Returns the principle ID, reasoning, \
         suggested interventions, and the triggers that indicated it."
    }

    /// JSON schema for the analysis tool's parameters.
    ///
    /// The principle id is constrained to the catalog's ids.
    pub fn tool_parameters(catalog: &PrincipleCatalog) -> serde_json::Value {
        let ids: Vec<&str> = catalog.ids().collect();

        json!({
            "type": "object",
            "properties": {
                "principle_id": {
                    "type": "string",
                    "enum": ids,
                    "description": format!(
                        "The ID of the most relevant behavioural principle. Available principles:\n{}",
                        Self::principle_listing(catalog)
                    ),
                },
                "reason": {
                    "type": "string",
                    "description": "Clear explanation of why this principle was selected based on the user's input",
                },
                "intervention_suggestions": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "maxItems": 3,
                    "description": "1-3 specific, actionable interventions tailored to the user's situation",
                },
                "triggers_matched": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Specific words or phrases from the user input that indicated this principle",
                },
            },
            "required": ["principle_id", "reason", "intervention_suggestions", "triggers_matched"],
        })
    }

    /// System prompt for behaviour analysis.
    pub fn build_system_prompt() -> String {
        let mut prompt = String::new();

        prompt.push_str("You are a financial habit coach grounded in behavioural science.\n");
        prompt.push_str("Read the user's situation and decide which single behavioural principle ");
        prompt.push_str("best explains it.\n\n");
        prompt.push_str(&format!(
            "Always answer by calling the `{}` tool. Do not reply in free text.\n",
            ANALYSIS_TOOL_NAME
        ));

        prompt
    }

    /// User prompt embedding the user's text and a summary of their history.
    pub fn build_analysis_prompt(user_input: &str, memory_context: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str("Analyze the following user situation and identify the most relevant ");
        prompt.push_str("behavioural science principle.\n\n");
        prompt.push_str(&format!("User Input: {}\n\n", user_input));
        prompt.push_str(&format!("User Context:\n{}\n\n", memory_context));
        prompt.push_str(&format!(
            "Please analyze this situation and use the {} tool to provide:\n",
            ANALYSIS_TOOL_NAME
        ));
        prompt.push_str("1. The most relevant behavioural principle ID\n");
        prompt.push_str("2. Clear reasoning for your selection\n");
        prompt.push_str("3. 1-3 specific, actionable intervention suggestions\n");
        prompt.push_str("4. The key triggers or phrases that led to your selection\n");

        prompt
    }
}
