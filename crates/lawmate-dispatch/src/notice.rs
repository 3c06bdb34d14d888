//! The one human-readable line shown when a fallback provider answered.

use lawmate_ai::LlmError;
use lawmate_core::ProviderKind;

fn provider_label(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => "OpenAI",
        ProviderKind::OllamaLocal => "Ollama (lokálně)",
        ProviderKind::OllamaCloud => "Ollama Cloud",
        ProviderKind::Mock => "offline režim",
    }
}

/// Short user-facing reason; never the raw provider response.
fn reason(err: &LlmError) -> &'static str {
    match err {
        LlmError::Auth(_) => "chybí nebo je neplatný API klíč",
        LlmError::RateLimit { .. } => "poskytovatel omezil počet požadavků",
        LlmError::Network(_) => "nepodařilo se spojit se serverem",
        LlmError::Provider { .. } => "poskytovatel vrátil chybu",
        LlmError::BackendUnavailable { .. } => {
            "lokální server Ollama neběží (spusťte `ollama serve`)"
        }
        LlmError::ModelNotFound(_) | LlmError::ModelAcquisition { .. } => {
            "model není k dispozici"
        }
        LlmError::Cancelled => "požadavek byl zrušen",
    }
}

pub fn fallback_notice(primary: ProviderKind, error: &LlmError, used: ProviderKind) -> String {
    format!(
        "{} nebyl dostupný: {}. Odpověď připravil záložní poskytovatel: {}.",
        provider_label(primary),
        reason(error),
        provider_label(used)
    )
}
