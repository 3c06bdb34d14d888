//! Offline stand-in provider.
//!
//! Produces a templated orientation answer from the legal domain and the
//! question alone, without any network access. The output depends only on
//! its inputs, so the application stays usable (and testable) with no
//! credentials and no inference server.

use async_trait::async_trait;
use lawmate_core::text::{MAX_KEYWORDS, extract_keywords, normalize_text};
use lawmate_core::{LegalDomain, ProviderKind};

use crate::error::LlmError;
use crate::provider::{ChatProvider, ChatRequest};

#[derive(Debug, Clone, Copy, Default)]
pub struct MockProvider;

impl MockProvider {
    /// Build the answer text. Never fails and never returns an empty string.
    pub fn answer(&self, domain: LegalDomain, message: &str) -> String {
        let question = normalize_text(message);
        let keywords = extract_keywords(&question, MAX_KEYWORDS);
        let topic = if keywords.is_empty() {
            "obecný dotaz".to_string()
        } else {
            keywords.join(", ")
        };

        let (steps, prepare) = match domain {
            LegalDomain::Criminal => (
                [
                    "Nic nepodepisujte, dokud nerozumíte, co podepisujete.",
                    "Máte právo na obhájce a právo nevypovídat proti sobě.",
                    "Zapište si, co se stalo, včetně časů a jmen.",
                ],
                "Všechny písemnosti, které jste k věci obdrželi.",
            ),
            LegalDomain::Civil => (
                [
                    "Sepište si časovou osu událostí.",
                    "Komunikujte s druhou stranou pokud možno písemně.",
                    "Zkuste nejdřív věc vyřešit dohodou.",
                ],
                "Smlouvy, objednávky, faktury, doklady o platbě a fotografie.",
            ),
            LegalDomain::General => (
                [
                    "Vyhledejte příslušný předpis v e-Sbírce (e-sbirka.cz).",
                    "Ověřte si, zda jde o aktuální znění předpisu.",
                    "Zapište si, co přesně potřebujete zjistit.",
                ],
                "Přesné znění otázky a dokumenty, kterých se týká.",
            ),
        };

        let mut out = String::new();
        out.push_str(&format!(
            "Shrnutí: Dotaz spadá do oblasti {}. Klíčové pojmy: {topic}. \
             Tato odpověď vznikla v offline režimu bez jazykového modelu a slouží jen k základní orientaci.\n\n",
            domain.label()
        ));
        out.push_str("Co udělat teď:\n");
        for step in steps {
            out.push_str(&format!("• {step}\n"));
        }
        out.push_str(&format!("\nCo si připravit:\n• {prepare}\n"));
        out.push_str(
            "\nKdy kontaktovat advokáta:\n• Když jde o vyšší částku nebo se věc týká přímo vás.\n",
        );
        out
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    fn model(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String, LlmError> {
        Ok(self.answer(request.domain, &request.user_message))
    }
}
