pub mod config;
pub mod domain;
pub mod text;
pub mod turn;

pub use config::ProviderConfig;
pub use domain::{LegalDomain, infer_domain};
pub use text::{extract_keywords, normalize_text};
pub use turn::{
    ChatMessage, Citation, Conversation, ConversationId, ProviderKind, RiskLevel, Role, Turn,
};
