use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// Per-field term frequencies.
pub type TermCounts = HashMap<String, u32>;

lazy_static! {
    // A word is a maximal run of letters, digits and underscores; everything else separates.
    // Spacing marks left after folding stay attached to their letter.
    static ref WORD: Regex = Regex::new(r"[\p{L}\p{M}\p{N}_]+").expect("valid regex");
    static ref NONSPACING_MARKS: Regex = Regex::new(r"\p{Mn}+").expect("valid regex");
}

/// Lowercase and strip diacritics: decompose, drop nonspacing marks, recompose.
pub fn fold(text: &str) -> String {
    let decomposed: String = text.to_lowercase().nfd().collect();
    let stripped = NONSPACING_MARKS.replace_all(&decomposed, "");
    stripped.nfc().collect()
}

/// Split text into normalized terms, in order of appearance. Never yields empty terms.
pub fn tokenize(text: &str) -> Vec<String> {
    let folded = fold(text);
    WORD.find_iter(&folded).map(|m| m.as_str().to_string()).collect()
}

/// Normalized form of `text`: its terms joined by single spaces.
pub fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}

/// Fold the term sequence of `text` into a term -> occurrence count map.
pub fn term_counts(text: &str) -> TermCounts {
    let mut counts = TermCounts::new();
    for term in tokenize(text) {
        *counts.entry(term).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert_eq!(t, vec!["running", "runner", "s", "run"]);
    }

    #[test]
    fn folds_accents_but_keeps_base_letters() {
        assert_eq!(fold("Crème Brûlée"), "creme brulee");
        assert_eq!(tokenize("naïve_façade"), vec!["naive_facade"]);
    }

    #[test]
    fn spacing_marks_are_kept() {
        // U+093F and U+093E are spacing vowel signs, U+094D (virama) is nonspacing
        assert_eq!(fold("कि"), "कि");
        assert_eq!(tokenize("किताब"), vec!["किताब"]);
        assert_eq!(fold("क्त"), "कत");
    }

    #[test]
    fn blank_input_has_no_terms() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  -- ?! ").is_empty());
        assert!(term_counts("...").is_empty());
    }
}
