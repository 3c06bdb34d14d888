//! Conversation and turn types shared between the dispatcher and history stores.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::LegalDomain;

/// Identifier of a conversation (a chat session in the history list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Conversation metadata. Turns are stored separately and read in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub domain: LegalDomain,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Semaphore level attached to every answer.
///
/// Ordered: `Green < Yellow < Red`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Green,
    Yellow,
    Red,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The backend that actually produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    OllamaLocal,
    OllamaCloud,
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OllamaLocal => "ollama-local",
            Self::OllamaCloud => "ollama-cloud",
            Self::Mock => "mock",
        }
    }

    /// Ollama hosted at ollama.com is the cloud flavour; anything else is a local server.
    pub fn for_ollama_url(base_url: &str) -> Self {
        if base_url.to_lowercase().contains("ollama.com") {
            Self::OllamaCloud
        } else {
            Self::OllamaLocal
        }
    }

    /// Whether requests to this backend are billed per use.
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::OpenAi | Self::OllamaCloud)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A role-tagged message as sent to chat-completion backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A court decision referenced by an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Case number (jednací číslo), e.g. `"25 Cdo 1234/2024"`.
    pub citation_id: String,
    pub title: String,
    pub url: String,
}

/// One question/answer exchange. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub created_at: DateTime<Utc>,
    pub user_message: String,
    pub domain: LegalDomain,
    pub answer_text: String,
    pub risk_level: RiskLevel,
    pub escalation_advice: String,
    pub provider_used: ProviderKind,
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Human-readable notice when the answer did not come from the primary provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl Turn {
    /// The turn as the user/assistant message pair fed back as context.
    pub fn as_messages(&self) -> [ChatMessage; 2] {
        [
            ChatMessage::user(self.user_message.clone()),
            ChatMessage::assistant(self.answer_text.clone()),
        ]
    }
}
