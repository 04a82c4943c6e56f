//! Coach Agent - LLM access for the HabitLedger coach
//!
//! Provides the infrastructure for asking a language model to classify a
//! user's situation through a structured tool call:
//! - Trait-based LLM backends (OpenAI-compatible HTTP, mock)
//! - Tool (function) definitions on requests and decoded tool calls on responses
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   detection::BackendClassifier          │
//! │   (builds the analyse_behaviour call)   │
//! └────────────────┬────────────────────────┘
//!                  │
//!                  ▼
//!           ┌─────────────┐
//!           │ LlmBackend  │
//!           │ (OpenAI /   │
//!           │  Mock)      │
//!           └─────────────┘
//! ```

pub mod backend;

// Re-export main types for convenience
pub use backend::traits::{
    CompletionRequest, CompletionResponse, FinishReason, LlmBackend, LlmError, Message,
    MessageRole, ModelCapabilities, ToolCall, ToolDefinition, Usage,
};
pub use backend::{MockBackend, OpenAiBackend};
