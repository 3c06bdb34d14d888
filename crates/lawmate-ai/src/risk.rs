//! Answer risk classification ("semafor").
//!
//! Maps a legal domain, the user's question and the generated answer to a
//! [`RiskLevel`] plus short escalation advice. The classifier is a pure,
//! total function of its inputs: it never fails and never uses randomness.
//!
//! # Policy
//!
//! 1. Empty answer → Yellow with generic advice.
//! 2. Red when a deadline / limitation-period signal is found in the question
//!    or answer, or when the domain is Criminal and a criminal-procedure
//!    keyword (police, summons, charge, …) is present.
//! 3. Yellow when the answer carries an uncertainty marker or flags missing
//!    information, when the domain is Criminal (higher baseline), when
//!    criminal-procedure keywords appear outside the Criminal domain, or when
//!    a high-stakes proceeding (enforcement, lawsuit, insolvency) is mentioned.
//! 4. Green otherwise.
//!
//! All keyword lists, deadline patterns and advice templates live in
//! [`RiskRules`]. The built-in defaults cover Czech and English; a JSON file
//! can replace any subset of them.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use lawmate_core::{LegalDomain, RiskLevel};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Placeholder substituted with the detected deadline or keyword.
pub const SIGNAL_PLACEHOLDER: &str = "{signal}";

/// Heuristic that contributed to a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTag {
    Deadline,
    CriminalProcedure,
    CriminalBaseline,
    HighStakes,
    Uncertainty,
    Ambiguity,
    EmptyAnswer,
}

/// Output of [`RiskClassifier::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub risk_level: RiskLevel,
    pub advice_text: String,
    pub rationale_tags: BTreeSet<RiskTag>,
    /// The phrase that decided the advice, e.g. `"lhůta 15 dní"`.
    pub signal: Option<String>,
}

/// Advice templates keyed by outcome. `{signal}` is replaced with the detected phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdviceTemplates {
    pub red_deadline: String,
    pub red_criminal: String,
    pub yellow_criminal: String,
    pub yellow_high_stakes: String,
    pub yellow_uncertain: String,
    pub green: String,
    pub empty_answer: String,
}

impl Default for AdviceTemplates {
    fn default() -> Self {
        Self {
            red_deadline: "Pozor na lhůtu ({signal}). Neodkládejte to a co nejdříve se obraťte \
                           na advokáta, zmeškání lhůty může být nevratné."
                .into(),
            red_criminal: "Jde o trestní věc s konkrétním úkonem ({signal}). Před jakýmkoli \
                           dalším krokem se poraďte s obhájcem."
                .into(),
            yellow_criminal: "Trestní věci mívají vážné následky. Pokud se vás situace týká \
                              přímo, zvažte konzultaci s obhájcem."
                .into(),
            yellow_high_stakes: "Věc může skončit před soudem nebo v exekuci ({signal}). \
                                 Zvažte konzultaci s advokátem."
                .into(),
            yellow_uncertain: "Odpověď není jednoznačná. Ověřte si podrobnosti a při \
                               pochybnostech se poraďte s odborníkem."
                .into(),
            green: "Jde o obecnou informaci. Pokud se situace týká přímo vás, ověřte si \
                    aktuální znění předpisů."
                .into(),
            empty_answer: "Odpověď se nepodařilo vyhodnotit. Obraťte se prosím na odborníka \
                           (advokáta nebo právní poradnu)."
                .into(),
        }
    }
}

/// Keyword lists and patterns driving the classifier.
///
/// Keyword matching is case-insensitive substring matching; patterns are
/// case-insensitive regular expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskRules {
    /// Regexes for concrete deadlines such as `lhůta 15 dní` or `within 30 days`.
    pub deadline_patterns: Vec<String>,
    /// Phrases implying a limitation period or imminent deadline.
    pub deadline_keywords: Vec<String>,
    /// Criminal-procedure steps that require the user to act.
    pub criminal_keywords: Vec<String>,
    /// Proceedings that raise the stakes of a civil matter.
    pub high_stakes_keywords: Vec<String>,
    /// Phrases by which an answer admits uncertainty.
    pub uncertainty_markers: Vec<String>,
    /// Phrases by which an answer flags missing information.
    pub ambiguity_markers: Vec<String>,
    pub advice: AdviceTemplates,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RiskRules {
    fn default() -> Self {
        Self {
            deadline_patterns: strings(&[
                r"\b(?:lhůt\w*|do|během|nejpozději|within|in)\s+(?:\w+\s+){0,2}?\d+\s*(?:pracovních\s+|kalendářních\s+|business\s+|calendar\s+)?(?:dní|dnů|dny|den|týdnů|týdny|týden|měsíců|měsíce|měsíc|let|roků|roky|roku|rok|days?|weeks?|months?|years?)\b",
            ]),
            deadline_keywords: strings(&[
                "promlč",
                "prekluz",
                "do zítra",
                "zmeškání lhůty",
                "limitation period",
                "statute of limitations",
            ]),
            criminal_keywords: strings(&[
                "polici",
                "policejní",
                "předvolání",
                "předvolán",
                "obvinění",
                "obviněn",
                "obžaloba",
                "zadržen",
                "výslech",
                "vazba",
                "trestní oznámení",
                "trestní příkaz",
                "státní zástupce",
                "police",
                "summons",
                "arrested",
                "charged with",
                "indictment",
                "detained",
            ]),
            high_stakes_keywords: strings(&[
                "exekuc",
                "exekutor",
                "insolvenc",
                "žaloba",
                "žalob",
                "platební rozkaz",
                "soudní řízení",
                "lawsuit",
                "enforcement",
                "insolvency",
            ]),
            uncertainty_markers: strings(&[
                "nejsem si jist",
                "nelze s jistotou",
                "nelze jednoznačně",
                "záleží na okolnostech",
                "pravděpodobně",
                "not sure",
                "uncertain",
                "it depends",
                "cannot say for certain",
            ]),
            ambiguity_markers: strings(&[
                "upřesněte",
                "chybí informace",
                "potřeboval bych vědět",
                "více informací",
                "please clarify",
                "more information",
                "unclear",
            ]),
            advice: AdviceTemplates::default(),
        }
    }
}

impl RiskRules {
    /// Load rules from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading risk rules from {}", path.display()))?;
        let rules: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing risk rules in {}", path.display()))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check that every deadline pattern compiles.
    pub fn validate(&self) -> anyhow::Result<()> {
        for pattern in &self.deadline_patterns {
            compile(pattern).with_context(|| format!("invalid deadline pattern {pattern:?}"))?;
        }
        Ok(())
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Deterministic semaphore classifier over a fixed [`RiskRules`].
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    rules: RiskRules,
    deadline_patterns: Vec<Regex>,
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new(RiskRules::default())
    }
}

impl RiskClassifier {
    /// Build a classifier. Patterns that fail to compile are logged and skipped;
    /// use [`RiskRules::validate`] to reject them up front.
    pub fn new(mut rules: RiskRules) -> Self {
        let deadline_patterns = rules
            .deadline_patterns
            .iter()
            .filter_map(|p| match compile(p) {
                Ok(re) => Some(re),
                Err(err) => {
                    warn!(pattern = %p, error = %err, "skipping invalid deadline pattern");
                    None
                }
            })
            .collect();

        for list in [
            &mut rules.deadline_keywords,
            &mut rules.criminal_keywords,
            &mut rules.high_stakes_keywords,
            &mut rules.uncertainty_markers,
            &mut rules.ambiguity_markers,
        ] {
            for kw in list.iter_mut() {
                *kw = kw.to_lowercase();
            }
            list.retain(|kw| !kw.trim().is_empty());
        }

        Self {
            rules,
            deadline_patterns,
        }
    }

    pub fn rules(&self) -> &RiskRules {
        &self.rules
    }

    /// Classify one answer.
    pub fn classify(
        &self,
        domain: LegalDomain,
        user_message: &str,
        answer_text: &str,
    ) -> ClassificationResult {
        let advice = &self.rules.advice;

        if answer_text.trim().is_empty() {
            return ClassificationResult {
                risk_level: RiskLevel::Yellow,
                advice_text: advice.empty_answer.clone(),
                rationale_tags: BTreeSet::from([RiskTag::EmptyAnswer]),
                signal: None,
            };
        }

        let combined = format!("{user_message}\n{answer_text}").to_lowercase();
        let answer = answer_text.to_lowercase();

        let deadline = self.find_deadline(&combined);
        let criminal = first_match(&self.rules.criminal_keywords, &combined);
        let high_stakes = first_match(&self.rules.high_stakes_keywords, &combined);
        let uncertain = first_match(&self.rules.uncertainty_markers, &answer);
        let ambiguous = first_match(&self.rules.ambiguity_markers, &answer);

        let mut tags = BTreeSet::new();
        if deadline.is_some() {
            tags.insert(RiskTag::Deadline);
        }
        if criminal.is_some() {
            tags.insert(RiskTag::CriminalProcedure);
        }
        if domain == LegalDomain::Criminal {
            tags.insert(RiskTag::CriminalBaseline);
        }
        if high_stakes.is_some() {
            tags.insert(RiskTag::HighStakes);
        }
        if uncertain.is_some() {
            tags.insert(RiskTag::Uncertainty);
        }
        if ambiguous.is_some() {
            tags.insert(RiskTag::Ambiguity);
        }

        let (risk_level, template, signal) = if let Some(signal) = deadline {
            (RiskLevel::Red, &advice.red_deadline, Some(signal))
        } else if domain == LegalDomain::Criminal && criminal.is_some() {
            (RiskLevel::Red, &advice.red_criminal, criminal)
        } else if domain == LegalDomain::Criminal || criminal.is_some() {
            (RiskLevel::Yellow, &advice.yellow_criminal, criminal)
        } else if high_stakes.is_some() {
            (RiskLevel::Yellow, &advice.yellow_high_stakes, high_stakes)
        } else if uncertain.is_some() || ambiguous.is_some() {
            (RiskLevel::Yellow, &advice.yellow_uncertain, uncertain.or(ambiguous))
        } else {
            (RiskLevel::Green, &advice.green, None)
        };

        ClassificationResult {
            risk_level,
            advice_text: render(template, signal.as_deref()),
            rationale_tags: tags,
            signal,
        }
    }

    fn find_deadline(&self, text: &str) -> Option<String> {
        self.deadline_patterns
            .iter()
            .find_map(|re| re.find(text).map(|m| m.as_str().trim().to_string()))
            .or_else(|| first_match(&self.rules.deadline_keywords, text))
    }
}

/// The keyword occurring earliest in `text`; the longer one wins a tie.
fn first_match(keywords: &[String], text: &str) -> Option<String> {
    keywords
        .iter()
        .filter_map(|kw| text.find(kw.as_str()).map(|pos| (pos, kw)))
        .min_by(|(pa, a), (pb, b)| pa.cmp(pb).then(b.len().cmp(&a.len())))
        .map(|(_, kw)| kw.clone())
}

fn render(template: &str, signal: Option<&str>) -> String {
    match signal {
        Some(s) => template.replace(SIGNAL_PLACEHOLDER, s),
        None => template
            .replace(&format!(" ({SIGNAL_PLACEHOLDER})"), "")
            .replace(SIGNAL_PLACEHOLDER, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(domain: LegalDomain, message: &str, answer: &str) -> ClassificationResult {
        RiskClassifier::default().classify(domain, message, answer)
    }

    #[test]
    fn criminal_deadline_is_red_and_names_deadline() {
        let r = classify(
            LegalDomain::Criminal,
            "Dostal jsem trestní příkaz, mám na odpor lhůta 15 dní?",
            "Proti trestnímu příkazu lze podat odpor.",
        );
        assert_eq!(r.risk_level, RiskLevel::Red);
        assert!(r.rationale_tags.contains(&RiskTag::Deadline));
        assert!(r.advice_text.contains("15 dní"), "{}", r.advice_text);
        assert_eq!(r.signal.as_deref(), Some("lhůta 15 dní"));
    }

    #[test]
    fn general_informational_question_is_green() {
        let r = classify(
            LegalDomain::General,
            "what is a contract?",
            "A contract is an agreement between parties that creates obligations.",
        );
        assert_eq!(r.risk_level, RiskLevel::Green);
        assert!(r.rationale_tags.is_empty());
        assert!(!r.advice_text.contains("{signal}"));
    }

    #[test]
    fn criminal_with_police_summons_is_red() {
        let r = classify(
            LegalDomain::Criminal,
            "Přišlo mi předvolání na policii",
            "Na výslech máte právo vzít si obhájce.",
        );
        assert_eq!(r.risk_level, RiskLevel::Red);
        assert!(r.rationale_tags.contains(&RiskTag::CriminalProcedure));
        assert!(r.advice_text.contains("předvolání"));
    }

    #[test]
    fn criminal_without_action_signal_is_yellow_baseline() {
        let r = classify(
            LegalDomain::Criminal,
            "Jaký je rozdíl mezi přestupkem a trestným činem?",
            "Trestný čin je závažnější než přestupek.",
        );
        assert_eq!(r.risk_level, RiskLevel::Yellow);
        assert!(r.rationale_tags.contains(&RiskTag::CriminalBaseline));
    }

    #[test]
    fn police_in_civil_domain_is_yellow_not_red() {
        let r = classify(
            LegalDomain::Civil,
            "Soused volal policii kvůli hluku",
            "Spory se sousedy se řeší dohodou.",
        );
        assert_eq!(r.risk_level, RiskLevel::Yellow);
    }

    #[test]
    fn uncertainty_in_civil_answer_is_yellow() {
        let r = classify(
            LegalDomain::Civil,
            "Můžu vrátit zboží koupené v obchodě?",
            "Nejsem si jistý, záleží na tom, zda jde o vadu.",
        );
        assert_eq!(r.risk_level, RiskLevel::Yellow);
        assert!(r.rationale_tags.contains(&RiskTag::Uncertainty));
    }

    #[test]
    fn flagged_ambiguity_is_yellow() {
        let r = classify(
            LegalDomain::General,
            "Co mám dělat?",
            "Prosím upřesněte, o jakou situaci jde.",
        );
        assert_eq!(r.risk_level, RiskLevel::Yellow);
        assert!(r.rationale_tags.contains(&RiskTag::Ambiguity));
    }

    #[test]
    fn uncertainty_in_question_alone_does_not_count() {
        let r = classify(
            LegalDomain::General,
            "Nejsem si jistý, co je zákon?",
            "Zákon je obecně závazný právní předpis.",
        );
        assert_eq!(r.risk_level, RiskLevel::Green);
    }

    #[test]
    fn enforcement_is_yellow_high_stakes() {
        let r = classify(
            LegalDomain::Civil,
            "Přišla mi exekuce na účet",
            "Exekuce se dá v některých případech zastavit.",
        );
        assert_eq!(r.risk_level, RiskLevel::Yellow);
        assert!(r.rationale_tags.contains(&RiskTag::HighStakes));
        assert!(r.advice_text.contains("exekuc"));
    }

    #[test]
    fn limitation_keyword_is_red() {
        let r = classify(
            LegalDomain::Civil,
            "Dluh je starý pět let",
            "Pohledávka už může být promlčená.",
        );
        assert_eq!(r.risk_level, RiskLevel::Red);
        assert_eq!(r.signal.as_deref(), Some("promlč"));
    }

    #[test]
    fn english_deadline_pattern() {
        let r = classify(
            LegalDomain::Civil,
            "My landlord wants me out",
            "You must respond within 30 days of the notice.",
        );
        assert_eq!(r.risk_level, RiskLevel::Red);
        assert_eq!(r.signal.as_deref(), Some("within 30 days"));
    }

    #[test]
    fn deadlines_in_years_are_red() {
        for (question, signal) in [
            ("Návrh musíte podat do 2 let od rozhodnutí.", "do 2 let"),
            ("Lhůta je 3 roky od doručení.", "lhůta je 3 roky"),
            ("You must file within 2 years.", "within 2 years"),
            ("Can I still sue? The claim expires in 1 year.", "in 1 year"),
        ] {
            let r = classify(LegalDomain::Civil, question, "Obraťte se na soud.");
            assert_eq!(r.risk_level, RiskLevel::Red, "{question}");
            assert_eq!(r.signal.as_deref(), Some(signal), "{question}");
        }
    }

    #[test]
    fn empty_answer_is_yellow_with_generic_advice() {
        let r = classify(LegalDomain::Criminal, "lhůta 15 dní", "   \n ");
        assert_eq!(r.risk_level, RiskLevel::Yellow);
        assert_eq!(r.rationale_tags, BTreeSet::from([RiskTag::EmptyAnswer]));
        assert_eq!(r.advice_text, AdviceTemplates::default().empty_answer);
    }

    #[test]
    fn classification_is_idempotent() {
        let clf = RiskClassifier::default();
        for domain in LegalDomain::ALL {
            let a = clf.classify(domain, "Dostal jsem žalobu, lhůta 15 dní", "Nejsem si jistý.");
            let b = clf.classify(domain, "Dostal jsem žalobu, lhůta 15 dní", "Nejsem si jistý.");
            assert_eq!(a, b);
        }
    }

    #[test]
    fn custom_rules_replace_keywords() {
        let rules = RiskRules {
            criminal_keywords: vec!["VÝSLECH".into()],
            ..RiskRules::default()
        };
        let clf = RiskClassifier::new(rules);
        let r = clf.classify(LegalDomain::Criminal, "Zítra mám výslech", "Vezměte si obhájce.");
        assert_eq!(r.risk_level, RiskLevel::Red);
        assert_eq!(r.signal.as_deref(), Some("výslech"));
    }

    #[test]
    fn invalid_pattern_is_skipped_not_fatal() {
        let rules = RiskRules {
            deadline_patterns: vec!["(unclosed".into()],
            ..RiskRules::default()
        };
        assert!(rules.validate().is_err());
        let clf = RiskClassifier::new(rules);
        let r = clf.classify(LegalDomain::General, "co je zákon", "Zákon je předpis.");
        assert_eq!(r.risk_level, RiskLevel::Green);
    }

    #[test]
    fn rules_load_from_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, r#"{ "deadline_keywords": ["do pátku"] }"#).unwrap();

        let rules = RiskRules::from_json_file(&path).unwrap();
        assert_eq!(rules.deadline_keywords, vec!["do pátku"]);
        assert_eq!(rules.criminal_keywords, RiskRules::default().criminal_keywords);

        let r = RiskClassifier::new(rules).classify(
            LegalDomain::Civil,
            "Musím zaplatit do pátku",
            "Zaplaťte včas.",
        );
        assert_eq!(r.risk_level, RiskLevel::Red);
    }

    #[test]
    fn rules_reject_bad_pattern_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, r#"{ "deadline_patterns": ["[a-"] }"#).unwrap();
        assert!(RiskRules::from_json_file(&path).is_err());
    }
}
