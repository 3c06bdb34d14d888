//! History layer: conversations and their append-only turns.
//!
//! [`HistoryStore`] is the seam the dispatcher writes through. Three
//! implementations ship here: [`MemoryStore`] (tests, ephemeral sessions),
//! [`JsonlStore`] (one JSON-lines file per conversation), and `DuckStore`
//! behind the `duckdb` feature.

mod error;
mod jsonl;
mod memory;

#[cfg(feature = "duckdb")]
mod duck;

pub use error::StoreError;
pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

#[cfg(feature = "duckdb")]
pub use duck::DuckStore;

use async_trait::async_trait;
use lawmate_core::{Conversation, ConversationId, LegalDomain, Turn};

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn create_conversation(
        &self,
        title: &str,
        domain: LegalDomain,
    ) -> Result<Conversation, StoreError>;

    /// All conversations, most recently updated first.
    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError>;

    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, StoreError>;

    /// Remove a conversation and all of its turns.
    async fn delete_conversation(&self, id: ConversationId) -> Result<(), StoreError>;

    /// Append a turn. Fails with [`StoreError::OutOfOrder`] if the turn is
    /// older than the last stored one.
    async fn append_turn(&self, id: ConversationId, turn: &Turn) -> Result<(), StoreError>;

    /// Turns in creation order.
    async fn read_turns(&self, id: ConversationId) -> Result<Vec<Turn>, StoreError>;
}

/// Title derived from the first question, like a chat sidebar shows it.
pub fn title_from_message(message: &str) -> String {
    const MAX_TITLE_CHARS: usize = 60;
    let normalized = lawmate_core::normalize_text(message);
    if normalized.is_empty() {
        return "Nová konverzace".into();
    }
    lawmate_core::text::truncate_chars(&normalized, MAX_TITLE_CHARS)
}

fn check_order(last: Option<&Turn>, turn: &Turn) -> Result<(), StoreError> {
    match last {
        Some(last) if turn.created_at < last.created_at => Err(StoreError::OutOfOrder {
            last: last.created_at.to_rfc3339(),
            attempted: turn.created_at.to_rfc3339(),
        }),
        _ => Ok(()),
    }
}

fn sort_by_recency(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_normalized_and_bounded() {
        assert_eq!(title_from_message("  Jak   podat\nžalobu? "), "Jak podat žalobu?");
        assert_eq!(title_from_message("   "), "Nová konverzace");
        let long = "slovo ".repeat(40);
        assert!(title_from_message(&long).chars().count() <= 61);
    }

    #[test]
    fn order_check_allows_equal_timestamps() {
        let a = testing::turn(1, "a");
        let b = testing::turn(1, "b");
        assert!(check_order(Some(&a), &b).is_ok());
        assert!(check_order(None, &a).is_ok());
        let older = testing::turn(0, "c");
        assert!(matches!(
            check_order(Some(&a), &older),
            Err(StoreError::OutOfOrder { .. })
        ));
    }
}
