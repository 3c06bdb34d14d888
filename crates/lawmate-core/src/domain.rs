//! Legal domains a question can be filed under, and keyword-based inference.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::text::normalize_text;

/// Area of law selected for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegalDomain {
    /// Trestní právo.
    Criminal,
    /// Občanské právo.
    Civil,
    /// Právní řád ČR obecně.
    General,
}

impl LegalDomain {
    pub const ALL: [LegalDomain; 3] = [Self::Criminal, Self::Civil, Self::General];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Criminal => "criminal",
            Self::Civil => "civil",
            Self::General => "general",
        }
    }

    /// Czech label shown to the user and rendered into prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Criminal => "Trestní právo",
            Self::Civil => "Občanské právo",
            Self::General => "Právní řád ČR (obecně)",
        }
    }

    fn terms(&self) -> &'static [&'static str] {
        match self {
            Self::Criminal => CRIMINAL_TERMS,
            Self::Civil => CIVIL_TERMS,
            Self::General => GENERAL_TERMS,
        }
    }
}

impl fmt::Display for LegalDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown legal domain: {0} (expected criminal, civil or general)")]
pub struct ParseDomainError(String);

impl FromStr for LegalDomain {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "criminal" | "trestní" | "trestni" => Ok(Self::Criminal),
            "civil" | "občanské" | "obcanske" => Ok(Self::Civil),
            "general" | "obecně" | "obecne" => Ok(Self::General),
            other => Err(ParseDomainError(other.to_string())),
        }
    }
}

const CRIMINAL_TERMS: &[&str] = &[
    "policie", "trestní", "trestný", "obviněn", "obžaloba", "zadržení", "předvolání",
    "státní zástupce", "kriminálka", "napadení", "ublížení", "násilí", "vyhrožuje", "vydírání",
    "krádež", "loupež", "podvod", "drogy", "řízení pod vlivem", "vražda", "usmrcení", "police",
    "arrested", "charged", "assault", "theft", "fraud",
];

const CIVIL_TERMS: &[&str] = &[
    "smlouva", "smlouvy", "faktura", "nezaplatil", "neplatí", "dluh", "půjčka", "žaloba",
    "výzva k úhradě", "náhrada škody", "reklamace", "vrácení", "záruka", "spotřebitel",
    "pronájem", "nájem", "kauce", "soused", "rozvod", "dědictví", "opatrovnictví",
    "péče o dítě", "zaměstnavatel", "výpověď z práce", "pracovní smlouva", "landlord", "tenant",
    "debt", "divorce", "inheritance", "refund",
];

const GENERAL_TERMS: &[&str] = &[
    "jaký je zákon", "jaký zákon platí", "paragraf", "sbírka", "ústav", "co říká zákon",
    "právní předpis", "vyhláška", "judikatura", "nejvyšší soud", "ústavní soud", "what is",
    "statute", "constitution",
];

/// Guess the legal domain of a question from keyword hits.
///
/// Each domain scores one point per distinct term found in the lowercased
/// text. The highest score wins, earlier domains in [`LegalDomain::ALL`] win
/// ties, and a question with no hits at all is filed under
/// [`LegalDomain::General`].
pub fn infer_domain(question: &str) -> LegalDomain {
    let text = normalize_text(question).to_lowercase();

    let mut best = LegalDomain::General;
    let mut best_score = 0usize;
    for domain in LegalDomain::ALL {
        let score = domain.terms().iter().filter(|t| text.contains(*t)).count();
        if score > best_score {
            best = domain;
            best_score = score;
        }
    }
    best
}
