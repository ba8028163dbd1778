//! Native classifier - in-process TF-IDF over manifest categories
//!
//! The last line of defense before a model call. Combines exact phrase
//! matches, IDF-weighted token overlap, and fuzzy token matching through
//! synonym normalization and a suffix stemmer. No I/O, no model, no
//! allocation beyond the scoring pass.

mod stem;
mod synonyms;

pub use stem::stem;
pub use synonyms::canonical;

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::manifest::Category;

/// Bonus for an exact phrase-alternative match
const EXACT_PHRASE_BONUS: f64 = 3.0;

/// Weight on the IDF-overlap signal per phrase alternative
const OVERLAP_WEIGHT: f64 = 1.5;

/// Confidence formula base coefficient
const CONFIDENCE_BASE: f64 = 0.65;

/// Confidence formula margin coefficient
const CONFIDENCE_MARGIN: f64 = 0.35;

/// Default confidence threshold below which there is no match
pub const DEFAULT_THRESHOLD: f64 = 0.35;

/// Function words dropped during tokenization; action verbs are kept
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "am", "do", "does", "did", "to", "of", "in",
    "on", "at", "for", "with", "from", "by", "as", "and", "or", "but", "if", "then", "than", "that", "this", "these",
    "those", "it", "its", "i", "me", "my", "you", "your", "we", "us", "our", "they", "them", "their", "he", "she",
    "his", "her", "what", "which", "who", "whom", "how", "when", "where", "why", "can", "could", "will", "would",
    "shall", "should", "may", "might", "must", "please", "about", "into", "over", "under", "again", "there", "here",
    "all", "any", "some", "no", "not", "only", "just", "so", "too", "very", "up", "down", "out",
];

/// A classification result above threshold
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category_id: String,
    /// Raw normalized score
    pub score: f64,
    /// Margin-adjusted confidence in (0, 1]
    pub confidence: f64,
}

/// The in-process TF-IDF classifier
#[derive(Debug, Clone)]
pub struct NativeClassifier {
    threshold: f64,
}

impl Default for NativeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeClassifier {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Classify an input against the category set
    ///
    /// Returns `None` when no category clears the confidence threshold.
    pub fn classify(&self, input: &str, categories: &[Category]) -> Option<Classification> {
        if categories.is_empty() {
            return None;
        }

        let input_lower = input.to_lowercase();
        let input_tokens: HashSet<String> = tokenize(&input_lower).into_iter().collect();

        let idf = compute_idf(categories);

        let mut scores: Vec<(usize, f64)> = categories
            .iter()
            .enumerate()
            .map(|(index, category)| (index, score_category(&input_lower, &input_tokens, category, &idf)))
            .collect();

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (best_index, best) = scores[0];
        if best <= 0.0 {
            return None;
        }
        let second = scores.get(1).map(|(_, s)| *s).unwrap_or(0.0).max(0.0);

        let margin = if best > 0.0 { (best - second) / best } else { 0.0 };
        let confidence = (best * (CONFIDENCE_BASE + CONFIDENCE_MARGIN * margin)).min(1.0);

        debug!(
            input,
            category = %categories[best_index].id,
            score = best,
            confidence,
            "Native classification"
        );

        if confidence < self.threshold {
            return None;
        }

        Some(Classification {
            category_id: categories[best_index].id.clone(),
            score: best,
            confidence,
        })
    }
}

/// Lowercase, strip non-alphanumerics, drop stop words and short tokens,
/// then normalize through synonyms and the stemmer
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .filter(|t| !STOP_WORDS.contains(t))
        .map(normalize_token)
        .collect()
}

fn normalize_token(token: &str) -> String {
    if let Some(canonical) = canonical(token) {
        return canonical.to_string();
    }
    let stemmed = stem(token);
    // A stem can land on a synonym alternative too
    canonical(&stemmed).map(str::to_string).unwrap_or(stemmed)
}

/// IDF per normalized term over the category corpus:
/// ln((N + 1) / (df + 1)) + 1
fn compute_idf(categories: &[Category]) -> HashMap<String, f64> {
    let n = categories.len() as f64;

    let mut document_frequency: HashMap<String, usize> = HashMap::new();
    for category in categories {
        let terms: HashSet<String> = category.alternatives().flat_map(tokenize).collect();
        for term in terms {
            *document_frequency.entry(term).or_default() += 1;
        }
    }

    document_frequency
        .into_iter()
        .map(|(term, df)| {
            let idf = ((n + 1.0) / (df as f64 + 1.0)).ln() + 1.0;
            (term, idf)
        })
        .collect()
}

fn score_category(
    input_lower: &str,
    input_tokens: &HashSet<String>,
    category: &Category,
    idf: &HashMap<String, f64>,
) -> f64 {
    if category.patterns.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;
    for alternative in category.alternatives() {
        if input_lower.contains(alternative) {
            score += EXACT_PHRASE_BONUS;
        }

        let phrase_tokens = tokenize(alternative);
        if phrase_tokens.is_empty() {
            continue;
        }

        let mut matched_idf = 0.0;
        let mut total_idf = 0.0;
        for token in &phrase_tokens {
            let weight = idf.get(token).copied().unwrap_or(1.0);
            total_idf += weight;
            if input_tokens.contains(token) {
                matched_idf += weight;
            }
        }
        if total_idf > 0.0 {
            score += OVERLAP_WEIGHT * (matched_idf / total_idf);
        }
    }

    // Normalize by pattern count so verbose categories gain no edge
    score / category.patterns.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{AgentType, PromptTier, default_categories};

    fn category(id: &str, patterns: &[&str]) -> Category {
        Category {
            id: id.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            tools: vec![],
            skills: vec![],
            agent_type: AgentType::React,
            prompt_tier: PromptTier::Standard,
        }
    }

    #[test]
    fn test_tokenize_drops_stop_words_and_shorts() {
        let tokens = tokenize("What is the weather in Paris?");
        assert!(tokens.contains(&"weather".to_string()));
        assert!(tokens.contains(&"paris".to_string()));
        assert!(!tokens.iter().any(|t| t == "what" || t == "the" || t == "is"));
    }

    #[test]
    fn test_tokenize_keeps_action_verbs() {
        let tokens = tokenize("create and delete the files");
        assert!(tokens.contains(&"create".to_string()));
        assert!(tokens.contains(&"delete".to_string()));
    }

    #[test]
    fn test_synonym_and_stem_normalization_agree() {
        // "making" stems to "mak"... no: synonym first misses, stem gives
        // "making" -> "mak"; but "make" maps to "create" directly
        assert_eq!(tokenize("make"), vec!["create".to_string()]);
        assert_eq!(tokenize("sms"), vec!["message".to_string()]);
    }

    #[test]
    fn test_self_recall_on_default_categories() {
        let classifier = NativeClassifier::new();
        let categories = default_categories();

        for expected in &categories {
            for alternative in expected.alternatives().take(2) {
                let result = classifier.classify(alternative, &categories);
                let result = result.unwrap_or_else(|| panic!("no match for {alternative:?}"));
                assert_eq!(result.category_id, expected.id, "input {alternative:?}");
            }
        }
    }

    #[test]
    fn test_fuzzy_match_through_synonyms() {
        let classifier = NativeClassifier::new();
        let categories = vec![
            category("files", &["create file|delete file"]),
            category("mail", &["send email|check inbox"]),
        ];

        // "make" -> "create", "document" -> "file"
        let result = classifier.classify("make a new document", &categories).unwrap();
        assert_eq!(result.category_id, "files");
    }

    #[test]
    fn test_zero_pattern_category_never_wins() {
        let classifier = NativeClassifier::new();
        let categories = vec![category("empty", &[]), category("real", &["send message"])];

        let result = classifier.classify("send a message", &categories).unwrap();
        assert_eq!(result.category_id, "real");

        let only_empty = vec![category("empty", &[])];
        assert!(classifier.classify("send a message", &only_empty).is_none());
    }

    #[test]
    fn test_unrelated_input_below_threshold() {
        let classifier = NativeClassifier::new();
        let categories = vec![
            category("files", &["create file|delete file"]),
            category("mail", &["send email"]),
        ];

        assert!(classifier.classify("quux flibbertigibbet", &categories).is_none());
    }

    #[test]
    fn test_confidence_in_unit_interval() {
        let classifier = NativeClassifier::new();
        let categories = vec![
            category("sms", &["send sms|text someone"]),
            category("files", &["create file"]),
        ];

        let result = classifier.classify("send sms to john", &categories).unwrap();
        assert_eq!(result.category_id, "sms");
        assert!(result.confidence > DEFAULT_THRESHOLD);
        assert!(result.confidence <= 1.0);
    }

    #[test]
    fn test_empty_input_no_match() {
        let classifier = NativeClassifier::new();
        let categories = default_categories();
        assert!(classifier.classify("", &categories).is_none());
    }

    #[test]
    fn test_margin_raises_confidence() {
        // Partial-overlap input so neither score saturates the formula
        let categories_close = vec![
            category("a", &["send message"]),
            category("b", &["send message now"]),
        ];
        let categories_clear = vec![
            category("a", &["send message"]),
            category("b", &["water the plants"]),
        ];

        let classifier = NativeClassifier::with_threshold(0.0);
        let close = classifier.classify("send", &categories_close).unwrap();
        let clear = classifier.classify("send", &categories_clear).unwrap();

        assert_eq!(close.category_id, "a");
        assert_eq!(clear.category_id, "a");
        assert!(clear.confidence > close.confidence);
    }
}
