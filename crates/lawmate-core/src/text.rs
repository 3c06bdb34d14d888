//! Text normalisation and keyword extraction for Czech legal questions.
//!
//! Questions arrive as free text typed by laypeople. Before they are matched
//! against court decisions or keyword tables they are collapsed into a single
//! line and lowercased; keyword extraction additionally drops short tokens and
//! common Czech function words.

use std::collections::HashSet;

/// Czech function words that carry no legal meaning.
const STOPWORDS: &[&str] = &[
    "aby", "ale", "ani", "ano", "bez", "bude", "budou", "byl", "byla", "byli", "bych", "bychom",
    "bys", "byste", "jeho", "její", "jen", "ještě", "jestli", "jsem", "jsme", "jste", "jsou",
    "kde", "kdo", "když", "kolem", "kolik", "komu", "která", "které", "který", "kvůli", "nad",
    "nebo", "než", "nic", "okolo", "pak", "pod", "podle", "pro", "proti", "protože", "spolu",
    "stejně", "své", "svého", "svémi", "svým", "svůj", "tady", "tak", "taky", "tam", "ten",
    "tento", "tuto", "vaše", "váš", "vám", "vás",
];

/// Default cap on extracted keywords.
pub const MAX_KEYWORDS: usize = 12;

/// Collapse all whitespace runs into single spaces and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract up to `max` distinct lowercase keywords, in order of first appearance.
///
/// A keyword is a run of at least three alphanumeric characters (Czech
/// diacritics included) that is not a stopword.
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let lowered = normalize_text(text).to_lowercase();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for word in lowered.split(|c: char| !c.is_alphanumeric()) {
        if out.len() >= max {
            break;
        }
        if word.chars().count() < 3 || STOPWORDS.contains(&word) {
            continue;
        }
        if seen.insert(word) {
            out.push(word.to_string());
        }
    }
    out
}

/// Truncate `text` to at most `max_chars` characters, appending `…` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
