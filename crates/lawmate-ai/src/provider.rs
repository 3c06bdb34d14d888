//! The uniform provider contract and the startup-time selection of a backend.

use async_trait::async_trait;
use lawmate_core::{ChatMessage, Citation, LegalDomain, ProviderConfig, ProviderKind};

use crate::error::LlmError;
use crate::mock::MockProvider;
use crate::ollama::OllamaClient;
use crate::openai::OpenAiClient;
use crate::prompts;

/// Everything a backend needs to answer one question.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system_prompt: String,
    /// Prior messages, already truncated to the context window.
    pub context: Vec<ChatMessage>,
    /// The question as typed by the user.
    pub user_message: String,
    pub domain: LegalDomain,
    /// Court decisions found for the question, rendered into the prompt.
    pub sources: Vec<Citation>,
}

impl ChatRequest {
    pub fn new(domain: LegalDomain, user_message: impl Into<String>) -> Self {
        Self {
            system_prompt: prompts::SYSTEM_PROMPT.to_string(),
            context: Vec::new(),
            user_message: user_message.into(),
            domain,
            sources: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: Vec<ChatMessage>) -> Self {
        self.context = context;
        self
    }

    pub fn with_sources(mut self, sources: Vec<Citation>) -> Self {
        self.sources = sources;
        self
    }

    /// The full role-tagged message list: system prompt, context, rendered question.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.context.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(self.context.iter().cloned());
        messages.push(ChatMessage::user(prompts::user_prompt(
            self.domain,
            &self.user_message,
            &self.sources,
        )));
        messages
    }
}

/// A backend that produces answer text for a [`ChatRequest`].
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// Generate a non-empty answer.
    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// One variant per backend, chosen once from [`ProviderConfig`].
pub enum Provider {
    OpenAi(OpenAiClient),
    Ollama(OllamaClient),
    Mock(MockProvider),
}

impl Provider {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self, LlmError> {
        Ok(match cfg.provider {
            ProviderKind::OpenAi => Self::OpenAi(OpenAiClient::new(cfg)?),
            ProviderKind::OllamaLocal | ProviderKind::OllamaCloud => {
                Self::Ollama(OllamaClient::new(cfg)?)
            }
            ProviderKind::Mock => Self::Mock(MockProvider),
        })
    }
}

#[async_trait]
impl ChatProvider for Provider {
    fn kind(&self) -> ProviderKind {
        match self {
            Self::OpenAi(p) => p.kind(),
            Self::Ollama(p) => p.kind(),
            Self::Mock(p) => p.kind(),
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::OpenAi(p) => p.model(),
            Self::Ollama(p) => p.model(),
            Self::Mock(p) => p.model(),
        }
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError> {
        match self {
            Self::OpenAi(p) => p.generate(request).await,
            Self::Ollama(p) => p.generate(request).await,
            Self::Mock(p) => p.generate(request).await,
        }
    }
}
