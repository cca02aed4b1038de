pub mod providers;

use std::sync::Arc;

use tripweave_core::config::ModelConfig;
use tripweave_core::traits::ReasoningClient;

pub use providers::openai::OpenAiClient;

/// Create a reasoning client for the configured model.
///
/// Every supported provider (OpenAI, Azure OpenAI, Ollama, vLLM, Groq, ...)
/// speaks the chat completions dialect, so they share one client.
pub fn create_client(config: &ModelConfig) -> Arc<dyn ReasoningClient> {
    Arc::new(OpenAiClient::new(config.clone()))
}
