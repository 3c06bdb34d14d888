//! File-backed store: a JSON index of conversations plus one JSON-lines file
//! of turns per conversation.
//!
//! ```text
//! <dir>/conversations.json
//! <dir>/turns/<conversation-id>.jsonl
//! ```

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use lawmate_core::{Conversation, ConversationId, LegalDomain, Turn};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{HistoryStore, StoreError, check_order, sort_by_recency};

const INDEX_FILE: &str = "conversations.json";
const TURNS_DIR: &str = "turns";

/// Parsed contents of one turns file.
struct TurnLog {
    turns: Vec<Turn>,
    /// Bytes holding complete lines; anything past this is a torn write.
    valid_len: u64,
    /// The last turn parsed but its newline never made it to disk.
    missing_newline: bool,
}

pub struct JsonlStore {
    dir: PathBuf,
    // Single writer: every read-modify-write of the index holds this.
    lock: Mutex<()>,
}

impl JsonlStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(TURNS_DIR)).await?;
        info!(path = %dir.display(), "opened history store");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn turns_path(&self, id: ConversationId) -> PathBuf {
        self.dir.join(TURNS_DIR).join(format!("{id}.jsonl"))
    }

    async fn load_index(&self) -> Result<Vec<Conversation>, StoreError> {
        match fs::read(self.index_path()).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file and rename over the index.
    async fn save_index(&self, conversations: &[Conversation]) -> Result<(), StoreError> {
        let path = self.index_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(conversations)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load_turns(&self, id: ConversationId) -> Result<TurnLog, StoreError> {
        let bytes = match fs::read(self.turns_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut log = TurnLog {
            turns: Vec::new(),
            valid_len: 0,
            missing_newline: false,
        };
        let mut rest = bytes.as_slice();
        while let Some(end) = rest.iter().position(|&b| b == b'\n') {
            let line = &rest[..end];
            if !line.trim_ascii().is_empty() {
                log.turns.push(serde_json::from_slice(line)?);
            }
            log.valid_len += end as u64 + 1;
            rest = &rest[end + 1..];
        }

        if !rest.trim_ascii().is_empty() {
            match serde_json::from_slice::<Turn>(rest) {
                Ok(turn) => {
                    log.turns.push(turn);
                    log.valid_len += rest.len() as u64;
                    log.missing_newline = true;
                }
                Err(e) => {
                    warn!(id = %id, bytes = rest.len(), error = %e, "ignoring torn trailing turn");
                }
            }
        }
        Ok(log)
    }
}

#[async_trait]
impl HistoryStore for JsonlStore {
    async fn create_conversation(
        &self,
        title: &str,
        domain: LegalDomain,
    ) -> Result<Conversation, StoreError> {
        let _guard = self.lock.lock().await;
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::new(),
            title: title.to_string(),
            domain,
            created_at: now,
            updated_at: now,
        };
        let mut index = self.load_index().await?;
        index.push(conversation.clone());
        self.save_index(&index).await?;
        debug!(id = %conversation.id, "created conversation");
        Ok(conversation)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut index = self.load_index().await?;
        sort_by_recency(&mut index);
        Ok(index)
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, StoreError> {
        let _guard = self.lock.lock().await;
        self.load_index()
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut index = self.load_index().await?;
        let before = index.len();
        index.retain(|c| c.id != id);
        if index.len() == before {
            return Err(StoreError::NotFound(id));
        }
        self.save_index(&index).await?;
        match fs::remove_file(self.turns_path(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(id = %id, "deleted conversation");
        Ok(())
    }

    async fn append_turn(&self, id: ConversationId, turn: &Turn) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut index = self.load_index().await?;
        let conversation = index
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::NotFound(id))?;

        let log = self.load_turns(id).await?;
        check_order(log.turns.last(), turn)?;

        let mut line = String::new();
        if log.missing_newline {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(turn)?);
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.turns_path(id))
            .await?;
        // Drop a torn tail so the new line starts on a clean boundary.
        if file.metadata().await?.len() > log.valid_len {
            file.set_len(log.valid_len).await?;
        }
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;

        conversation.updated_at = conversation.updated_at.max(turn.created_at);
        self.save_index(&index).await?;
        debug!(id = %id, turns = log.turns.len() + 1, "appended turn");
        Ok(())
    }

    async fn read_turns(&self, id: ConversationId) -> Result<Vec<Turn>, StoreError> {
        let _guard = self.lock.lock().await;
        if !self.load_index().await?.iter().any(|c| c.id == id) {
            return Err(StoreError::NotFound(id));
        }
        Ok(self.load_turns(id).await?.turns)
    }
}
