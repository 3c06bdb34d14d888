//! Prompt templates for the legal assistant.

use lawmate_core::{Citation, LegalDomain};

pub const SYSTEM_PROMPT: &str = "\
Jsi Lawmate, orientační právní asistent pro laiky v České republice.
Pomáháš uživateli pochopit jeho situaci. Nejde o právní službu ani o závazné stanovisko.

Pravidla:
- Nikdy netvrď, že jsi advokát.
- Vysvětluj jednoduše, bez zbytečného žargonu.
- Když hrozí trestní řízení, soud, exekuce, vysoká částka nebo krátká lhůta, řekni to výslovně \
a doporuč kontakt s advokátem.
- Lhůty uváděj konkrétně (např. \"lhůta 15 dní\"). Když lhůtu neznáš, napiš \"nejsem si jistý\".
- Když ti chybí informace, napiš, co je potřeba upřesnit.
- Nepřebírej ani neopakuj osobní údaje.";

/// Render the user turn: legal area, question, and any court decisions found.
pub fn user_prompt(domain: LegalDomain, question: &str, sources: &[Citation]) -> String {
    let sources_block = if sources.is_empty() {
        "(žádné)".to_string()
    } else {
        sources
            .iter()
            .map(|c| format!("- {} <{}>", c.title, c.url))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Oblast: {area}\n\
         \n\
         Dotaz uživatele:\n\
         {question}\n\
         \n\
         Dostupná judikatura (může být prázdná):\n\
         {sources_block}\n\
         \n\
         Odpověz česky v těchto částech: Shrnutí, Co udělat teď, Co si připravit, \
         Související předpisy, Lhůty, Kdy kontaktovat advokáta.",
        area = domain.label(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_without_sources() {
        let p = user_prompt(LegalDomain::General, "Co je smlouva?", &[]);
        assert!(p.starts_with("Oblast: Právní řád ČR (obecně)"));
        assert!(p.contains("Co je smlouva?"));
        assert!(p.contains("(žádné)"));
    }

    #[test]
    fn prompt_lists_sources() {
        let sources = vec![Citation {
            citation_id: "25 Cdo 1/2025".into(),
            title: "Nejvyšší soud – 25 Cdo 1/2025 (2025-01-10)".into(),
            url: "https://rozhodnuti.justice.cz/rozhodnuti/1".into(),
        }];
        let p = user_prompt(LegalDomain::Civil, "Náhrada škody", &sources);
        assert!(p.contains("- Nejvyšší soud – 25 Cdo 1/2025 (2025-01-10) <https://rozhodnuti.justice.cz/rozhodnuti/1>"));
        assert!(!p.contains("(žádné)"));
    }
}
