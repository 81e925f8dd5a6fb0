//! Token-overlap precision/recall/F1 and exact match.

use super::clamp_unit;
use super::tokenize::{clipped_overlap, ngram_counts, normalize, tokenize};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LexicalScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Multiset token overlap between a response and its ground truth.
pub fn lexical_scores(response: &[String], ground_truth: &[String]) -> LexicalScores {
    let common = clipped_overlap(&ngram_counts(response, 1), &ngram_counts(ground_truth, 1)) as f64;

    let precision = if response.is_empty() {
        0.0
    } else {
        common / response.len() as f64
    };
    let recall = if ground_truth.is_empty() {
        0.0
    } else {
        common / ground_truth.len() as f64
    };

    LexicalScores {
        precision: clamp_unit(precision),
        recall: clamp_unit(recall),
        f1: f1(precision, recall),
    }
}

/// Tokenizing convenience wrapper around [`lexical_scores`].
pub fn score_lexical(response: &str, ground_truth: &str) -> LexicalScores {
    lexical_scores(&tokenize(response), &tokenize(ground_truth))
}

/// Harmonic mean; 0 when both inputs are 0.
pub fn f1(precision: f64, recall: f64) -> f64 {
    let sum = precision + recall;
    if sum <= 0.0 {
        0.0
    } else {
        clamp_unit(2.0 * precision * recall / sum)
    }
}

pub fn exact_match(response: &str, ground_truth: &str) -> f64 {
    if normalize(response) == normalize(ground_truth) {
        1.0
    } else {
        0.0
    }
}
