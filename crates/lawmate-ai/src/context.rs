//! Bounded conversation context sent along with each question.

use lawmate_core::ChatMessage;
use serde::{Deserialize, Serialize};

/// How much prior conversation is replayed to the model.
///
/// Oldest messages are dropped first until both limits hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub max_messages: usize,
    pub max_chars: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            max_messages: 8,
            max_chars: 12_000,
        }
    }
}

impl ContextWindow {
    /// Keep the most recent messages that fit the window, in original order.
    pub fn truncate(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut kept = Vec::new();
        let mut chars = 0usize;

        for msg in history.iter().rev() {
            if kept.len() >= self.max_messages {
                break;
            }
            let len = msg.content.chars().count();
            if chars + len > self.max_chars {
                break;
            }
            chars += len;
            kept.push(msg.clone());
        }

        kept.reverse();
        kept
    }
}
