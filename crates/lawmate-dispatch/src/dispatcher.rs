use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use lawmate_ai::{
    BootstrapRegistry, ChatRequest, ContextWindow, LlmError, ProgressFn, PullProgress,
    RetryPolicy, RiskClassifier, retry_with_backoff,
};
use lawmate_core::{Citation, ConversationId, LegalDomain, Turn, infer_domain};
use lawmate_justice::{CaseSearch, DEFAULT_LOOKBACK_DAYS, NoSearch};
use lawmate_store::HistoryStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::DispatchError;
use crate::notice::fallback_notice;
use crate::slot::ProviderSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    pub context: ContextWindow,
    pub retry: RetryPolicy,
    /// Days of court decisions to search; 0 disables the search.
    pub lookback_days: u32,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            context: ContextWindow::default(),
            retry: RetryPolicy::default(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

type TurnLocks = Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>;

/// A conversation's turn lock, removed from the map when the last user lets go.
struct TurnLock<'a> {
    locks: &'a TurnLocks,
    id: ConversationId,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for TurnLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only taken under the map lock, so 2 means map plus us.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.id);
        }
    }
}

pub struct Dispatcher {
    slots: Vec<ProviderSlot>,
    registry: Arc<BootstrapRegistry>,
    classifier: Arc<RiskClassifier>,
    history: Arc<dyn HistoryStore>,
    search: Arc<dyn CaseSearch>,
    progress: Arc<ProgressFn<'static>>,
    options: DispatchOptions,
    // One in-flight turn per conversation.
    turn_locks: TurnLocks,
}

impl Dispatcher {
    /// A dispatcher that tries `primary` and then the offline mock.
    pub fn new(primary: ProviderSlot, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            slots: vec![primary],
            registry: Arc::new(BootstrapRegistry::default()),
            classifier: Arc::new(RiskClassifier::default()),
            history,
            search: Arc::new(NoSearch),
            progress: Arc::new(|_: PullProgress| {}),
            options: DispatchOptions::default(),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Explicitly configured providers tried after the primary, in order.
    pub fn with_fallbacks(mut self, fallbacks: impl IntoIterator<Item = ProviderSlot>) -> Self {
        self.slots.extend(fallbacks);
        self
    }

    pub fn with_registry(mut self, registry: Arc<BootstrapRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<RiskClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_search(mut self, search: Arc<dyn CaseSearch>) -> Self {
        self.search = search;
        self
    }

    /// Receives model pull progress while a backend is being bootstrapped.
    pub fn with_progress(mut self, progress: Arc<ProgressFn<'static>>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn registry(&self) -> &Arc<BootstrapRegistry> {
        &self.registry
    }

    /// The full fallback order, ending with the offline mock.
    pub fn slots(&self) -> Vec<ProviderSlot> {
        let mut slots = self.slots.clone();
        if slots.last().is_none_or(|s| s.kind() != lawmate_core::ProviderKind::Mock) {
            slots.push(ProviderSlot::mock());
        }
        slots
    }

    /// Run the bootstrap for every slot that needs one, e.g. ahead of the first question.
    pub async fn prepare(
        &self,
        cancel: &CancellationToken,
    ) -> Vec<(ProviderSlot, Result<(), LlmError>)> {
        let mut out = Vec::new();
        for slot in self.slots() {
            if let Some(backend) = slot.backend() {
                let result = self
                    .registry
                    .ensure_ready(backend.as_ref(), self.progress.as_ref(), cancel)
                    .await;
                out.push((slot.clone(), result));
            }
        }
        out
    }

    /// Forget cached bootstrap results, including failures, and run them again.
    pub async fn rebootstrap(
        &self,
        cancel: &CancellationToken,
    ) -> Vec<(ProviderSlot, Result<(), LlmError>)> {
        for slot in &self.slots {
            if let Some(backend) = slot.backend() {
                self.registry.invalidate(&backend.key());
            }
        }
        self.prepare(cancel).await
    }

    fn turn_lock(&self, id: ConversationId) -> TurnLock<'_> {
        let lock = self
            .turn_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone();
        TurnLock {
            locks: &self.turn_locks,
            id,
            lock,
        }
    }

    /// Answer one question in `conversation` and append the resulting turn.
    ///
    /// `domain = None` infers the legal area from the question. Cancellation
    /// at any point returns [`DispatchError::Cancelled`] and stores nothing.
    pub async fn dispatch(
        &self,
        conversation: ConversationId,
        domain: Option<LegalDomain>,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<Turn, DispatchError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(DispatchError::EmptyMessage);
        }
        let domain = domain.unwrap_or_else(|| infer_domain(message));

        let entry = self.turn_lock(conversation);
        let _turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
            guard = entry.lock.lock() => guard,
        };

        let prior = self.history.read_turns(conversation).await?;
        let context: Vec<_> = prior.iter().flat_map(Turn::as_messages).collect();
        let context = self.options.context.truncate(&context);

        let citations = self.find_citations(message, cancel).await?;
        let request = ChatRequest::new(domain, message)
            .with_context(context)
            .with_sources(citations.clone());

        info!(
            conversation = %conversation,
            domain = %domain,
            context = request.context.len(),
            citations = citations.len(),
            "dispatching question"
        );

        let slots = self.slots();
        let mut first_error: Option<LlmError> = None;
        let mut answered = None;
        for (idx, slot) in slots.iter().enumerate() {
            match self.attempt(slot, &request, cancel).await {
                Ok(answer) => {
                    answered = Some((idx, slot.kind(), answer));
                    break;
                }
                Err(LlmError::Cancelled) => return Err(DispatchError::Cancelled),
                Err(err) => {
                    warn!(
                        provider = %slot.kind(),
                        error = %err,
                        kind = err.kind(),
                        "provider failed, falling back"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        let Some((used_idx, provider_used, answer_text)) = answered else {
            let err = first_error.unwrap_or(LlmError::Provider {
                status: 0,
                body: "no provider configured".into(),
            });
            return Err(DispatchError::Unavailable(err));
        };

        let notice = match &first_error {
            Some(err) if used_idx > 0 => Some(fallback_notice(slots[0].kind(), err, provider_used)),
            _ => None,
        };

        let classification = self.classifier.classify(domain, message, &answer_text);

        // Never older than the last stored turn, even if the clock stepped back.
        let mut created_at = Utc::now();
        if let Some(last) = prior.last() {
            created_at = created_at.max(last.created_at);
        }
        let turn = Turn {
            created_at,
            user_message: message.to_string(),
            domain,
            answer_text,
            risk_level: classification.risk_level,
            escalation_advice: classification.advice_text,
            provider_used,
            citations,
            notice,
        };

        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        self.history.append_turn(conversation, &turn).await?;
        info!(
            conversation = %conversation,
            provider = %turn.provider_used,
            risk = %turn.risk_level,
            tags = ?classification.rationale_tags,
            "turn stored"
        );
        Ok(turn)
    }

    async fn find_citations(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Citation>, DispatchError> {
        if self.options.lookback_days == 0 {
            return Ok(Vec::new());
        }
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
            r = self.search.search_cases(message, self.options.lookback_days) => r,
        };
        Ok(result.unwrap_or_else(|e| {
            warn!(error = %e, "judicature search failed, answering without sources");
            Vec::new()
        }))
    }

    /// Bootstrap if needed, then generate with retries. A `ModelNotFound`
    /// answer invalidates the bootstrap, re-runs it once and retries once.
    async fn attempt(
        &self,
        slot: &ProviderSlot,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        if let Some(backend) = slot.backend() {
            self.registry
                .ensure_ready(backend.as_ref(), self.progress.as_ref(), cancel)
                .await?;
        }

        let generate = || {
            retry_with_backoff(&self.options.retry, cancel, |attempt| {
                debug!(provider = %slot.kind(), attempt, "calling provider");
                slot.provider.generate(request)
            })
        };

        match (generate().await, slot.backend()) {
            (Err(LlmError::ModelNotFound(model)), Some(backend)) => {
                warn!(provider = %slot.kind(), model = %model, "model vanished, re-running bootstrap");
                self.registry.invalidate(&backend.key());
                self.registry
                    .ensure_ready(backend.as_ref(), self.progress.as_ref(), cancel)
                    .await?;
                generate().await
            }
            (result, _) => result,
        }
    }
}
