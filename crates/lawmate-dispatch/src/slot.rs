use std::sync::Arc;

use lawmate_ai::{ChatProvider, LlmError, MockProvider, ModelBackend, Provider};
use lawmate_core::{ProviderConfig, ProviderKind};

/// One provider in the fallback order, with its bootstrap hook if it has one.
#[derive(Clone)]
pub struct ProviderSlot {
    pub(crate) provider: Arc<dyn ChatProvider>,
    pub(crate) backend: Option<Arc<dyn ModelBackend>>,
}

impl ProviderSlot {
    pub fn new(provider: Arc<dyn ChatProvider>, backend: Option<Arc<dyn ModelBackend>>) -> Self {
        Self { provider, backend }
    }

    /// Build the adapter for `cfg`. Ollama backends are bootstrapped before use.
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self, LlmError> {
        Ok(match Provider::from_config(cfg)? {
            Provider::Ollama(client) => {
                let client = Arc::new(client);
                Self::new(client.clone(), Some(client as Arc<dyn ModelBackend>))
            }
            other => Self::new(Arc::new(other), None),
        })
    }

    pub fn mock() -> Self {
        Self::new(Arc::new(MockProvider), None)
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn backend(&self) -> Option<&Arc<dyn ModelBackend>> {
        self.backend.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ollama_slots_bootstrap() {
        let ollama = ProviderSlot::from_config(&ProviderConfig::ollama(
            "http://localhost:11434",
            "llama3.1:8b",
            None,
        ))
        .unwrap();
        assert!(ollama.backend().is_some());
        assert_eq!(ollama.kind(), ProviderKind::OllamaLocal);

        let openai =
            ProviderSlot::from_config(&ProviderConfig::openai(Some("k".into()), "gpt-4o-mini"))
                .unwrap();
        assert!(openai.backend().is_none());
        assert_eq!(openai.model(), "gpt-4o-mini");

        let mock = ProviderSlot::from_config(&ProviderConfig::mock()).unwrap();
        assert_eq!(mock.kind(), ProviderKind::Mock);
        assert!(mock.backend().is_none());
    }
}
