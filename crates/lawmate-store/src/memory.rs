use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use lawmate_core::{Conversation, ConversationId, LegalDomain, Turn};
use tokio::sync::Mutex;

use crate::{HistoryStore, StoreError, check_order, sort_by_recency};

#[derive(Default)]
struct Inner {
    conversations: HashMap<ConversationId, Conversation>,
    turns: HashMap<ConversationId, Vec<Turn>>,
}

/// Ephemeral store; everything is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn turn_count(&self) -> usize {
        self.inner.lock().await.turns.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn create_conversation(
        &self,
        title: &str,
        domain: LegalDomain,
    ) -> Result<Conversation, StoreError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::new(),
            title: title.to_string(),
            domain,
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.inner.lock().await;
        inner.turns.insert(conversation.id, Vec::new());
        inner.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        let inner = self.inner.lock().await;
        let mut all: Vec<Conversation> = inner.conversations.values().cloned().collect();
        sort_by_recency(&mut all);
        Ok(all)
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .conversations
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.turns.remove(&id);
        inner
            .conversations
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn append_turn(&self, id: ConversationId, turn: &Turn) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let Inner {
            conversations,
            turns,
        } = &mut *inner;
        let conversation = conversations.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let list = turns.entry(id).or_default();
        check_order(list.last(), turn)?;
        list.push(turn.clone());
        conversation.updated_at = conversation.updated_at.max(turn.created_at);
        Ok(())
    }

    async fn read_turns(&self, id: ConversationId) -> Result<Vec<Turn>, StoreError> {
        let inner = self.inner.lock().await;
        if !inner.conversations.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        Ok(inner.turns.get(&id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::turn;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn turns_are_read_back_in_order() {
        let store = MemoryStore::new();
        let conv = store.create_conversation("nájem", LegalDomain::Civil).await.unwrap();
        store.append_turn(conv.id, &turn(1, "první")).await.unwrap();
        store.append_turn(conv.id, &turn(2, "druhý")).await.unwrap();

        let turns = store.read_turns(conv.id).await.unwrap();
        let questions: Vec<_> = turns.iter().map(|t| t.user_message.as_str()).collect();
        assert_eq!(questions, vec!["první", "druhý"]);
        assert_eq!(store.turn_count().await, 2);
    }

    #[tokio::test]
    async fn rejects_out_of_order_turn() {
        let store = MemoryStore::new();
        let conv = store.create_conversation("x", LegalDomain::General).await.unwrap();
        store.append_turn(conv.id, &turn(5, "později")).await.unwrap();

        let err = store.append_turn(conv.id, &turn(4, "dříve")).await.unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrder { .. }));
        assert_eq!(store.read_turns(conv.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found() {
        let store = MemoryStore::new();
        let id = ConversationId::new();
        assert!(matches!(store.read_turns(id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.append_turn(id, &turn(0, "q")).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.delete_conversation(id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_is_most_recent_first_and_delete_removes() {
        let store = MemoryStore::new();
        let a = store.create_conversation("a", LegalDomain::Civil).await.unwrap();
        let b = store.create_conversation("b", LegalDomain::Criminal).await.unwrap();
        store
            .append_turn(a.id, &turn(60 * 24 * 365 * 100, "bump"))
            .await
            .unwrap();

        let titles: Vec<_> = store
            .list_conversations()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["a", "b"]);

        store.delete_conversation(a.id).await.unwrap();
        let remaining = store.list_conversations().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);
        assert!(store.read_turns(a.id).await.is_err());
    }
}
