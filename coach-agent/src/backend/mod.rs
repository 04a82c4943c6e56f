//! LLM Backend abstraction layer.
//!
//! Provides a clean trait-based interface for different LLM inference backends:
//! - OpenAI-compatible (OpenAI, Gemini compatibility endpoint, vLLM, Ollama)
//! - Mock backend for testing

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockBackend;
pub use openai::OpenAiBackend;
pub use traits::{
    CompletionRequest, CompletionResponse, FinishReason, LlmBackend, LlmError, Message,
    MessageRole, ModelCapabilities, ToolCall, ToolDefinition, Usage,
};
