//! Suffix stemmer for classifier token normalization
//!
//! A small longest-first rule table covering common English inflections.
//! Deliberately not a full Porter stemmer: rules only fire when the
//! remaining stem stays plausible, trading recall for precision.

/// Minimum stem length after stripping a suffix
const MIN_STEM: usize = 3;

/// Suffix rules, longest first; the second element replaces the suffix
const SUFFIXES: &[(&str, &str)] = &[
    ("ation", "ate"),
    ("ition", ""),
    ("ical", "ic"),
    ("able", ""),
    ("ible", ""),
    ("ment", ""),
    ("ness", ""),
    ("ing", ""),
    ("ied", "y"),
    ("ies", "y"),
    ("ed", ""),
    ("ly", ""),
    ("er", ""),
    ("es", ""),
    ("s", ""),
];

/// Reduce a lowercase word to its stem
pub fn stem(word: &str) -> String {
    for (suffix, replacement) in SUFFIXES {
        if let Some(base) = word.strip_suffix(suffix) {
            if base.len() + replacement.len() < MIN_STEM {
                continue;
            }
            let mut stemmed = format!("{base}{replacement}");
            if *suffix == "ing" {
                undouble(&mut stemmed);
            }
            return stemmed;
        }
    }
    word.to_string()
}

/// Restore doubled final consonants: running -> runn -> run
fn undouble(word: &mut String) {
    let bytes = word.as_bytes();
    if bytes.len() >= MIN_STEM + 1 {
        let last = bytes[bytes.len() - 1];
        let prev = bytes[bytes.len() - 2];
        if last == prev && last.is_ascii_alphabetic() && !matches!(last, b'l' | b's' | b'e') {
            word.pop();
        }
    }
}
