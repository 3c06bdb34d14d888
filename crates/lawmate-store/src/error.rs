use lawmate_core::ConversationId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),

    #[error("turn from {attempted} is older than the last stored turn ({last})")]
    OutOfOrder { last: String, attempted: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt history record: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("{0}")]
    Other(String),
}
