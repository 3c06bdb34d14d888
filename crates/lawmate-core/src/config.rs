//! Provider configuration handed to the engine by the configuration loader.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::turn::ProviderKind;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Connection settings for one backend.
///
/// Built once at startup and never mutated; rotating a credential requires a
/// restart. `Debug` redacts the API key.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl ProviderConfig {
    /// The offline stand-in. Needs no URL, model or credential.
    pub fn mock() -> Self {
        Self {
            provider: ProviderKind::Mock,
            base_url: String::new(),
            api_key: None,
            model_name: "mock".into(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: None,
        }
    }

    pub fn openai(api_key: Option<String>, model_name: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            base_url: DEFAULT_OPENAI_BASE_URL.into(),
            api_key: non_empty(api_key),
            model_name: model_name.into(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: None,
        }
    }

    /// An Ollama server; local or cloud is decided by the URL.
    pub fn ollama(
        base_url: impl Into<String>,
        model_name: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            provider: ProviderKind::for_ollama_url(&base_url),
            base_url,
            api_key: non_empty(api_key),
            model_name: model_name.into(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Request timeout: explicit value, else 60 s for OpenAI and 120 s for Ollama.
    pub fn timeout(&self) -> Duration {
        let secs = self.timeout_secs.unwrap_or(match self.provider {
            ProviderKind::OpenAi => 60,
            _ => 120,
        });
        Duration::from_secs(secs)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model_name", &self.model_name)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
