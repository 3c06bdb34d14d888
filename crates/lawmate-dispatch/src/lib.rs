//! Dispatch orchestration: one user question in, one classified and
//! persisted [`Turn`](lawmate_core::Turn) out.
//!
//! The [`Dispatcher`] walks an ordered list of [`ProviderSlot`]s (primary,
//! configured fallbacks, then the offline mock), bootstrapping local backends
//! on first use and retrying transient failures before moving on.

mod dispatcher;
mod notice;
mod slot;

pub use dispatcher::{DispatchOptions, Dispatcher};
pub use notice::fallback_notice;
pub use slot::ProviderSlot;

use lawmate_ai::LlmError;
use lawmate_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("the question is empty")]
    EmptyMessage,

    #[error("cancelled")]
    Cancelled,

    #[error("history store failed: {0}")]
    History(#[from] StoreError),

    /// Even the offline stand-in did not produce an answer.
    #[error("no provider could answer: {0}")]
    Unavailable(LlmError),
}
