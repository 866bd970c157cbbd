//! Rule-based intent classification and question detection.
//!
//! Used when the AI-provided intent is missing or unrecognized, and to flag
//! question keywords regardless of what the AI said.

use std::sync::LazyLock;

use regex::Regex;

use openkeywords_shared::Intent;

/// Marker words per intent for one language.
struct IntentPatterns {
    comparison: Regex,
    transactional: Regex,
    commercial: Regex,
}

fn word_set(words: &[&str]) -> Regex {
    let alternation = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("valid regex")
}

static EN_PATTERNS: LazyLock<IntentPatterns> = LazyLock::new(|| IntentPatterns {
    comparison: word_set(&[
        "vs",
        "versus",
        "alternative",
        "alternatives",
        "difference",
        "compared",
        "comparison",
    ]),
    transactional: word_set(&["book", "buy", "purchase", "order", "get", "hire", "sign up"]),
    commercial: word_set(&[
        "best", "top", "review", "reviews", "pricing", "cost", "price", "rated", "compare",
    ]),
});

static DE_PATTERNS: LazyLock<IntentPatterns> = LazyLock::new(|| IntentPatterns {
    comparison: word_set(&[
        "vs",
        "versus",
        "alternative",
        "unterschied",
        "vergleich",
        "oder",
    ]),
    transactional: word_set(&[
        "buchen",
        "kaufen",
        "bestellen",
        "termin",
        "anfragen",
        "vereinbaren",
    ]),
    commercial: word_set(&[
        "beste",
        "bester",
        "top",
        "kosten",
        "preis",
        "bewertung",
        "erfahrungen",
    ]),
});

static DEFAULT_PATTERNS: LazyLock<IntentPatterns> = LazyLock::new(|| IntentPatterns {
    comparison: word_set(&["vs", "versus", "alternative", "difference", "compared"]),
    transactional: word_set(&["book", "buy", "purchase", "order", "get"]),
    commercial: word_set(&["best", "top", "review", "pricing", "cost"]),
});

fn patterns_for(lang: &str) -> &'static IntentPatterns {
    match lang {
        "en" => &EN_PATTERNS,
        "de" => &DE_PATTERNS,
        _ => &DEFAULT_PATTERNS,
    }
}

/// Words that open a question, per language. Unknown languages use English.
fn question_starters(lang: &str) -> &'static [&'static str] {
    match lang {
        "de" => &[
            "wie", "was", "warum", "wann", "wo", "welch", "wer", "woher", "wohin", "weshalb",
        ],
        "fr" => &["comment", "quoi", "pourquoi", "quand", "où", "quel", "qui"],
        "es" => &["cómo", "qué", "por qué", "cuándo", "dónde", "cuál", "quién"],
        "it" => &["come", "cosa", "perché", "quando", "dove", "quale", "chi"],
        "nl" => &["hoe", "wat", "waarom", "wanneer", "waar", "welke", "wie"],
        _ => &[
            "how", "what", "why", "when", "where", "which", "who", "can", "should", "is", "are",
        ],
    }
}

/// Whether `keyword` opens with a question word in `lang`.
///
/// The starter must be a whole leading word (or word prefix for stems such
/// as German `welch`), so "isolation tips" is not a question.
pub fn is_question(keyword: &str, lang: &str) -> bool {
    let lower = keyword.trim().to_lowercase();
    question_starters(lang).iter().any(|starter| {
        lower.strip_prefix(starter).is_some_and(|rest| {
            rest.is_empty()
                || rest.starts_with(|c: char| !c.is_alphanumeric())
                || (lang == "de" && *starter == "welch")
        })
    })
}

/// Classify a keyword by its wording alone.
///
/// Order: question starters, then comparison, transactional and commercial
/// markers; anything else is informational.
pub fn classify(keyword: &str, lang: &str) -> Intent {
    if is_question(keyword, lang) {
        return Intent::Question;
    }
    let patterns = patterns_for(lang);
    if patterns.comparison.is_match(keyword) {
        Intent::Comparison
    } else if patterns.transactional.is_match(keyword) {
        Intent::Transactional
    } else if patterns.commercial.is_match(keyword) {
        Intent::Commercial
    } else {
        Intent::Informational
    }
}

/// Settle the final intent and question flag for an AI-proposed keyword.
///
/// A recognized AI label wins over the rules. A question keyword is always
/// `Intent::Question`.
pub fn resolve(
    keyword: &str,
    ai_intent: Option<&str>,
    ai_is_question: bool,
    lang: &str,
) -> (Intent, bool) {
    let intent = ai_intent
        .and_then(Intent::parse)
        .unwrap_or_else(|| classify(keyword, lang));
    let question = ai_is_question || intent == Intent::Question || is_question(keyword, lang);
    if question {
        (Intent::Question, true)
    } else {
        (intent, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_question_starters() {
        assert!(is_question("how to automate invoices", "en"));
        assert!(is_question("Is crm worth it", "en"));
        assert!(!is_question("isolation booth pricing", "en"));
        assert!(!is_question("automation how to", "en"));
    }

    #[test]
    fn other_languages_use_own_starters() {
        assert!(is_question("wie funktioniert buchhaltung", "de"));
        assert!(is_question("welche software für praxen", "de"));
        assert!(is_question("comment choisir un crm", "fr"));
        assert!(!is_question("how to choose a crm", "fr"));
        // unknown language falls back to English
        assert!(is_question("what is seo", "pt"));
    }

    #[test]
    fn classification_order() {
        assert_eq!(classify("hubspot vs salesforce", "en"), Intent::Comparison);
        assert_eq!(classify("buy project software", "en"), Intent::Transactional);
        assert_eq!(classify("best crm for startups", "en"), Intent::Commercial);
        assert_eq!(classify("crm data model basics", "en"), Intent::Informational);
        // question wins over comparison markers
        assert_eq!(classify("what is the best alternative", "en"), Intent::Question);
    }

    #[test]
    fn markers_match_whole_words() {
        // "get" must not match inside "budget"
        assert_eq!(classify("budget planning template", "en"), Intent::Informational);
    }

    #[test]
    fn german_patterns() {
        assert_eq!(classify("steuerberater kosten münchen", "de"), Intent::Commercial);
        assert_eq!(classify("termin buchen zahnarzt", "de"), Intent::Transactional);
    }

    #[test]
    fn resolve_prefers_ai_label() {
        assert_eq!(
            resolve("crm pricing plans", Some("Transactional"), false, "en"),
            (Intent::Transactional, false)
        );
        assert_eq!(
            resolve("crm pricing plans", Some("navigational"), false, "en"),
            (Intent::Commercial, false)
        );
    }

    #[test]
    fn resolve_forces_question_intent() {
        assert_eq!(
            resolve("how much does a crm cost", Some("commercial"), false, "en"),
            (Intent::Question, true)
        );
        assert_eq!(
            resolve("crm for dentists", Some("informational"), true, "en"),
            (Intent::Question, true)
        );
    }
}
