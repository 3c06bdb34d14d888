//! One-time readiness check and model acquisition for inference backends.
//!
//! Each `(base_url, model)` key moves through
//! `NotChecked → Checking → Missing → Acquiring → Ready | Failed`.
//! A per-key async mutex serializes callers, so concurrent turns wait for one
//! pull instead of starting their own. Both `Ready` and `Failed` are kept for
//! the lifetime of the registry; only [`BootstrapRegistry::invalidate`]
//! sends a key back to `NotChecked`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LlmError;

/// How long a model pull may take before it counts as failed.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Progress of a model pull, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullProgress {
    pub status: String,
    pub completed: Option<u64>,
    pub total: Option<u64>,
}

impl PullProgress {
    pub fn percent(&self) -> Option<u8> {
        match (self.completed, self.total) {
            (Some(done), Some(total)) if total > 0 => {
                Some((done.min(total).saturating_mul(100) / total) as u8)
            }
            _ => None,
        }
    }
}

impl fmt::Display for PullProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent() {
            Some(pct) => write!(f, "{} {pct}%", self.status),
            None => f.write_str(&self.status),
        }
    }
}

pub type ProgressFn<'a> = dyn Fn(PullProgress) + Send + Sync + 'a;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapKey {
    pub base_url: String,
    pub model: String,
}

impl BootstrapKey {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            model: model.trim().to_string(),
        }
    }
}

impl fmt::Display for BootstrapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.model, self.base_url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BootstrapState {
    #[default]
    NotChecked,
    Checking,
    Missing,
    Acquiring,
    Ready,
    Failed(LlmError),
}

/// The operations the bootstrapper needs from a backend.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn key(&self) -> BootstrapKey;

    /// False for hosted backends that serve any model they list.
    fn pulls_models(&self) -> bool;

    /// Short liveness check.
    async fn probe(&self) -> Result<(), LlmError>;

    async fn list_models(&self) -> Result<Vec<String>, LlmError>;

    async fn pull_model(&self, model: &str, progress: &ProgressFn<'_>) -> Result<(), LlmError>;
}

/// Case-insensitive model name match where `llama3` also matches `llama3:latest`.
pub fn model_matches(available: &str, wanted: &str) -> bool {
    let available = available.trim().to_lowercase();
    let wanted = wanted.trim().to_lowercase();
    if available == wanted {
        return true;
    }
    let strip = |name: &str| name.strip_suffix(":latest").map(str::to_string);
    match (strip(&available), strip(&wanted)) {
        (Some(a), None) => a == wanted,
        (None, Some(w)) => w == available,
        _ => false,
    }
}

struct Slot {
    gate: tokio::sync::Mutex<()>,
    state: Mutex<BootstrapState>,
}

impl Slot {
    /// The settled result, if any.
    fn cached(&self) -> Option<Result<(), LlmError>> {
        match self.get() {
            BootstrapState::Ready => Some(Ok(())),
            BootstrapState::Failed(err) => Some(Err(err)),
            _ => None,
        }
    }

    fn get(&self) -> BootstrapState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, key: &BootstrapKey, state: BootstrapState) {
        debug!(key = %key, state = ?state, "bootstrap state");
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Process-wide bootstrap cache, shared by every dispatcher that talks to
/// the same backends.
pub struct BootstrapRegistry {
    slots: Mutex<HashMap<BootstrapKey, Arc<Slot>>>,
    acquire_timeout: Duration,
}

impl Default for BootstrapRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ACQUIRE_TIMEOUT)
    }
}

impl BootstrapRegistry {
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            acquire_timeout,
        }
    }

    fn slot(&self, key: &BootstrapKey) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Slot {
                    gate: tokio::sync::Mutex::new(()),
                    state: Mutex::new(BootstrapState::NotChecked),
                })
            })
            .clone()
    }

    pub fn state(&self, key: &BootstrapKey) -> BootstrapState {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).map(|s| s.get()).unwrap_or_default()
    }

    /// Forget a cached result so the next [`ensure_ready`](Self::ensure_ready) re-checks.
    pub fn invalidate(&self, key: &BootstrapKey) {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(key) {
            info!(key = %key, "invalidating bootstrap result");
            slot.set(key, BootstrapState::NotChecked);
        }
    }

    /// Make sure the backend is reachable and has its model.
    ///
    /// Runs at most once per key: later callers get the cached `Ready` or
    /// `Failed` result until the key is invalidated. Cancellation aborts the
    /// wait for the per-key lock or the running check and leaves the key
    /// re-checkable.
    pub async fn ensure_ready(
        &self,
        backend: &dyn ModelBackend,
        progress: &ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), LlmError> {
        let key = backend.key();
        let slot = self.slot(&key);
        if let Some(result) = slot.cached() {
            return result;
        }

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            guard = slot.gate.lock() => guard,
        };
        // Another caller may have finished while we waited.
        if let Some(result) = slot.cached() {
            return result;
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
            r = self.run(&slot, &key, backend, progress) => r,
        };

        match &outcome {
            Ok(()) => {
                info!(key = %key, "backend ready");
                slot.set(&key, BootstrapState::Ready);
            }
            Err(LlmError::Cancelled) => slot.set(&key, BootstrapState::NotChecked),
            Err(err) => {
                warn!(key = %key, error = %err, "bootstrap failed");
                slot.set(&key, BootstrapState::Failed(err.clone()));
            }
        }
        outcome
    }

    async fn run(
        &self,
        slot: &Slot,
        key: &BootstrapKey,
        backend: &dyn ModelBackend,
        progress: &ProgressFn<'_>,
    ) -> Result<(), LlmError> {
        slot.set(key, BootstrapState::Checking);
        backend.probe().await?;
        if !backend.pulls_models() {
            return Ok(());
        }

        let installed = backend.list_models().await?;
        if installed.iter().any(|m| model_matches(m, &key.model)) {
            return Ok(());
        }

        slot.set(key, BootstrapState::Missing);
        info!(key = %key, "model not installed, pulling");
        progress(PullProgress {
            status: format!("pulling {}", key.model),
            completed: None,
            total: None,
        });
        slot.set(key, BootstrapState::Acquiring);

        let acquisition = |reason: String| LlmError::ModelAcquisition {
            model: key.model.clone(),
            reason,
        };
        match tokio::time::timeout(self.acquire_timeout, backend.pull_model(&key.model, progress))
            .await
        {
            Err(_) => {
                return Err(acquisition(format!(
                    "timed out after {}s",
                    self.acquire_timeout.as_secs()
                )));
            }
            Ok(Err(err @ LlmError::ModelAcquisition { .. })) => return Err(err),
            Ok(Err(err)) => return Err(acquisition(err.to_string())),
            Ok(Ok(())) => {}
        }

        let installed = backend
            .list_models()
            .await
            .map_err(|e| acquisition(e.to_string()))?;
        if installed.iter().any(|m| model_matches(m, &key.model)) {
            Ok(())
        } else {
            Err(acquisition("model still absent after pull".into()))
        }
    }
}
