//! Inference layer: provider adapters (OpenAI, Ollama, offline mock), backend
//! bootstrap, retry policy, prompts, and answer risk classification.

pub mod bootstrap;
pub mod context;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod prompts;
pub mod provider;
pub mod retry;
pub mod risk;

pub use bootstrap::{
    BootstrapKey, BootstrapRegistry, BootstrapState, ModelBackend, ProgressFn, PullProgress,
};
pub use context::ContextWindow;
pub use error::LlmError;
pub use mock::MockProvider;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use provider::{ChatProvider, ChatRequest, Provider};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use risk::{ClassificationResult, RiskClassifier, RiskRules, RiskTag};
