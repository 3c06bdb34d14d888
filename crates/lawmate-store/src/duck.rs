//! DuckDB-backed history store.
//!
//! Two tables: `conversations` (one row per conversation) and `turns`
//! (one row per turn, the turn itself kept as a JSON payload next to its
//! sequence number and timestamp). Timestamps are stored as UTC
//! microseconds so ordering happens in SQL.
//!
//! Supports both in-memory (ephemeral) and persistent (file-backed) modes.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{Connection, params};
use lawmate_core::{Conversation, ConversationId, LegalDomain, Turn};
use tracing::info;

use crate::{HistoryStore, StoreError, check_order};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    id VARCHAR PRIMARY KEY,
    title VARCHAR NOT NULL,
    domain VARCHAR NOT NULL,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS turns (
    conversation_id VARCHAR NOT NULL,
    seq BIGINT NOT NULL,
    created_at BIGINT NOT NULL,
    payload VARCHAR NOT NULL
);
";

pub struct DuckStore {
    conn: Mutex<Connection>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), "opened duckdb history store");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn turn_count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn()
            .query_row("SELECT count(*)::BIGINT FROM turns", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Other(format!("timestamp out of range: {micros}")))
}

type ConversationRow = (String, String, String, i64, i64);

fn to_conversation(row: ConversationRow) -> Result<Conversation, StoreError> {
    let (id, title, domain, created_at, updated_at) = row;
    Ok(Conversation {
        id: id
            .parse()
            .map_err(|e| StoreError::Other(format!("bad conversation id {id}: {e}")))?,
        title,
        domain: domain
            .parse::<LegalDomain>()
            .map_err(|e| StoreError::Other(e.to_string()))?,
        created_at: from_micros(created_at)?,
        updated_at: from_micros(updated_at)?,
    })
}

fn select_conversations(
    conn: &Connection,
    where_clause: &str,
    args: &[&dyn duckdb::ToSql],
) -> Result<Vec<Conversation>, StoreError> {
    let sql = format!(
        "SELECT id, title, domain, created_at, updated_at FROM conversations {where_clause} \
         ORDER BY updated_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(args, |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?
        .collect::<Result<Vec<ConversationRow>, _>>()?;
    rows.into_iter().map(to_conversation).collect()
}

fn select_turns(conn: &Connection, id: ConversationId) -> Result<Vec<Turn>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT payload FROM turns WHERE conversation_id = ? ORDER BY seq")?;
    let payloads = stmt
        .query_map([id.to_string()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    payloads
        .iter()
        .map(|p| serde_json::from_str(p).map_err(StoreError::from))
        .collect()
}

fn exists(conn: &Connection, id: ConversationId) -> Result<bool, StoreError> {
    let n: i64 = conn.query_row(
        "SELECT count(*)::BIGINT FROM conversations WHERE id = ?",
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

#[async_trait]
impl HistoryStore for DuckStore {
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
        let micros = now.timestamp_micros();
        self.conn().execute(
            "INSERT INTO conversations VALUES (?, ?, ?, ?, ?)",
            params![
                conversation.id.to_string(),
                conversation.title,
                domain.as_str(),
                micros,
                micros
            ],
        )?;
        Ok(conversation)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        select_conversations(&self.conn(), "", &[])
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, StoreError> {
        let id_text = id.to_string();
        select_conversations(&self.conn(), "WHERE id = ?", &[&id_text])?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound(id))
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), StoreError> {
        let conn = self.conn();
        let removed = conn.execute("DELETE FROM conversations WHERE id = ?", [id.to_string()])?;
        if removed == 0 {
            return Err(StoreError::NotFound(id));
        }
        conn.execute("DELETE FROM turns WHERE conversation_id = ?", [id.to_string()])?;
        Ok(())
    }

    async fn append_turn(&self, id: ConversationId, turn: &Turn) -> Result<(), StoreError> {
        let conn = self.conn();
        if !exists(&conn, id)? {
            return Err(StoreError::NotFound(id));
        }
        let existing = select_turns(&conn, id)?;
        check_order(existing.last(), turn)?;

        let at = turn.created_at.timestamp_micros();
        let seq = existing.len() as i64;
        let payload = serde_json::to_string(turn)?;
        conn.execute(
            "INSERT INTO turns VALUES (?, ?, ?, ?)",
            params![id.to_string(), seq, at, payload],
        )?;
        conn.execute(
            "UPDATE conversations SET updated_at = greatest(updated_at, ?) WHERE id = ?",
            params![at, id.to_string()],
        )?;
        Ok(())
    }

    async fn read_turns(&self, id: ConversationId) -> Result<Vec<Turn>, StoreError> {
        let conn = self.conn();
        if !exists(&conn, id)? {
            return Err(StoreError::NotFound(id));
        }
        select_turns(&conn, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::turn;

    #[tokio::test]
    async fn round_trip_in_memory() {
        let store = DuckStore::open().unwrap();
        let conv = store.create_conversation("dluh", LegalDomain::Civil).await.unwrap();
        store.append_turn(conv.id, &turn(1, "a")).await.unwrap();
        store.append_turn(conv.id, &turn(2, "b")).await.unwrap();

        let turns = store.read_turns(conv.id).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].user_message, "b");
        assert_eq!(store.turn_count().unwrap(), 2);
        assert_eq!(store.get_conversation(conv.id).await.unwrap().domain, LegalDomain::Civil);
    }

    #[tokio::test]
    async fn rejects_out_of_order_turn() {
        let store = DuckStore::open().unwrap();
        let conv = store.create_conversation("x", LegalDomain::General).await.unwrap();
        store.append_turn(conv.id, &turn(3, "a")).await.unwrap();
        assert!(matches!(
            store.append_turn(conv.id, &turn(2, "b")).await,
            Err(StoreError::OutOfOrder { .. })
        ));
    }

    #[tokio::test]
    async fn persistent_reopen_keeps_history() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("history.duckdb");

        let store = DuckStore::open_persistent(&db_path).unwrap();
        let conv = store.create_conversation("x", LegalDomain::Criminal).await.unwrap();
        store.append_turn(conv.id, &turn(0, "q")).await.unwrap();
        drop(store);

        let store = DuckStore::open_persistent(&db_path).unwrap();
        let listed = store.list_conversations().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].domain, LegalDomain::Criminal);
        assert_eq!(store.read_turns(conv.id).await.unwrap().len(), 1);

        store.delete_conversation(conv.id).await.unwrap();
        assert_eq!(store.turn_count().unwrap(), 0);
    }
}
