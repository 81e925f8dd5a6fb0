use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

// Word runs, keeping in-word apostrophes ("don't", "o'clock").
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+(?:['’]\w+)*").unwrap());

/// Case-folded word tokens; punctuation and whitespace are separators.
pub fn tokenize(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Trimmed, case-folded, inner whitespace collapsed.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Multiset of contiguous `n`-grams. Empty when `n` is 0 or exceeds the
/// token count.
pub fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if n == 0 || tokens.len() < n {
        return counts;
    }
    for gram in tokens.windows(n) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}

/// Sum over shared n-grams of min(candidate count, reference count).
pub fn clipped_overlap<'a>(
    candidate: &HashMap<&'a [String], usize>,
    reference: &HashMap<&'a [String], usize>,
) -> usize {
    candidate
        .iter()
        .map(|(gram, count)| (*count).min(reference.get(gram).copied().unwrap_or(0)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation_and_case() {
        assert_eq!(
            tokenize("AI is artificial intelligence."),
            vec!["ai", "is", "artificial", "intelligence"]
        );
        assert_eq!(tokenize("Don't stop!"), vec!["don't", "stop"]);
        assert!(tokenize("  ... ").is_empty());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Paris\n is  NICE "), "paris is nice");
    }

    #[test]
    fn test_ngram_counts() {
        let tokens = tokenize("a b a b");
        let bigrams = ngram_counts(&tokens, 2);
        assert_eq!(bigrams.len(), 2);
        assert_eq!(bigrams.values().sum::<usize>(), 3);
        assert!(ngram_counts(&tokens, 5).is_empty());
        assert!(ngram_counts(&tokens, 0).is_empty());
    }

    #[test]
    fn test_clipped_overlap() {
        let cand = tokenize("the the the the");
        let reference = tokenize("the cat the mat");
        let overlap = clipped_overlap(&ngram_counts(&cand, 1), &ngram_counts(&reference, 1));
        assert_eq!(overlap, 2);
    }
}
