//! Judicature search: recent Czech court decisions relevant to a question.
//!
//! The dispatcher only sees [`CaseSearch`]; [`JusticeClient`] walks the
//! `rozhodnuti.justice.cz` open-data feed day by day and ranks decisions by
//! keyword overlap with the question.

pub mod client;

pub use client::{Decision, JusticeClient, SearchError};

use async_trait::async_trait;
use lawmate_core::Citation;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOOKBACK_DAYS: u32 = 14;
pub const DEFAULT_MAX_ITEMS_PER_DAY: usize = 200;
/// Citations returned per question.
pub const MAX_RESULTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JusticeConfig {
    /// How many days back to look; 0 disables the search.
    pub lookback_days: u32,
    pub max_items_per_day: usize,
}

impl Default for JusticeConfig {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            max_items_per_day: DEFAULT_MAX_ITEMS_PER_DAY,
        }
    }
}

/// Best-effort lookup of court decisions. An empty result is valid.
#[async_trait]
pub trait CaseSearch: Send + Sync {
    async fn search_cases(
        &self,
        query_text: &str,
        max_age_days: u32,
    ) -> Result<Vec<Citation>, SearchError>;
}

/// Search that never finds anything, for offline use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSearch;

#[async_trait]
impl CaseSearch for NoSearch {
    async fn search_cases(&self, _: &str, _: u32) -> Result<Vec<Citation>, SearchError> {
        Ok(Vec::new())
    }
}
