//! Sentence-level BLEU with configurable order, weights and smoothing.
//!
//! BLEU = BP × exp(Σ wₙ log pₙ), BP = exp(1 − r/c) when c < r, else 1.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::clamp_unit;
use super::tokenize::{clipped_overlap, ngram_counts, tokenize};
use crate::config::{DEFAULT_BLEU_EPSILON, DEFAULT_BLEU_MAX_ORDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Smoothing {
    /// Plain modified precision; any zero order makes the score 0.
    None,
    /// Zero match counts are replaced by `epsilon`.
    Epsilon,
    /// Orders n ≥ 2 use (matches + 1) / (total + 1).
    AddOne,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BleuConfig {
    pub max_order: usize,
    /// One weight per order; empty means uniform.
    pub weights: Vec<f64>,
    pub smoothing: Smoothing,
    pub epsilon: f64,
}

impl Default for BleuConfig {
    fn default() -> Self {
        Self {
            max_order: DEFAULT_BLEU_MAX_ORDER,
            weights: Vec::new(),
            smoothing: Smoothing::AddOne,
            epsilon: DEFAULT_BLEU_EPSILON,
        }
    }
}

impl BleuConfig {
    /// Weights for orders 1..=max_order. Falls back to uniform when the
    /// configured weights are the wrong length, negative, or sum to 0.
    pub fn order_weights(&self) -> Vec<f64> {
        let order = self.max_order.max(1);
        let valid = self.weights.len() == order
            && self.weights.iter().all(|w| w.is_finite() && *w >= 0.0)
            && self.weights.iter().sum::<f64>() > 0.0;
        if valid {
            self.weights.clone()
        } else {
            if !self.weights.is_empty() {
                warn!(
                    "Ignoring BLEU weights {:?} for max order {}; using uniform",
                    self.weights, order
                );
            }
            vec![1.0 / order as f64; order]
        }
    }
}

pub fn bleu(response: &[String], ground_truth: &[String], config: &BleuConfig) -> f64 {
    if response.is_empty() || ground_truth.is_empty() {
        return 0.0;
    }

    let weights = config.order_weights();
    let mut log_sum = 0.0;
    let mut weight_sum = 0.0;

    for (i, weight) in weights.iter().enumerate() {
        let n = i + 1;
        let cand = ngram_counts(response, n);
        let total: usize = cand.values().sum();
        // Orders longer than the response are skipped and weights renormalized.
        if total == 0 || *weight == 0.0 {
            continue;
        }
        let matches = clipped_overlap(&cand, &ngram_counts(ground_truth, n));

        let precision = match config.smoothing {
            Smoothing::None => matches as f64 / total as f64,
            Smoothing::Epsilon if matches == 0 => config.epsilon.max(0.0) / total as f64,
            Smoothing::Epsilon => matches as f64 / total as f64,
            Smoothing::AddOne if n >= 2 => (matches + 1) as f64 / (total + 1) as f64,
            Smoothing::AddOne => matches as f64 / total as f64,
        };
        if precision <= 0.0 {
            return 0.0;
        }

        log_sum += weight * precision.ln();
        weight_sum += weight;
    }

    if weight_sum <= 0.0 {
        return 0.0;
    }

    clamp_unit(brevity_penalty(response.len(), ground_truth.len()) * (log_sum / weight_sum).exp())
}

/// Tokenizing convenience wrapper around [`bleu`].
pub fn score_bleu(response: &str, ground_truth: &str, config: &BleuConfig) -> f64 {
    bleu(&tokenize(response), &tokenize(ground_truth), config)
}

pub fn brevity_penalty(response_len: usize, truth_len: usize) -> f64 {
    if response_len == 0 {
        0.0
    } else if response_len >= truth_len {
        1.0
    } else {
        (1.0 - truth_len as f64 / response_len as f64).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_is_one() {
        let text = "the quick brown fox jumps over the lazy dog";
        let score = score_bleu(text, text, &BleuConfig::default());
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reordered_is_partial() {
        let score = score_bleu(
            "AI is artificial intelligence.",
            "Artificial intelligence is AI.",
            &BleuConfig::default(),
        );
        assert!(score > 0.0);
        assert!(score < 1.0);
    }

    #[test]
    fn test_no_smoothing_zero_on_missing_order() {
        let config = BleuConfig {
            smoothing: Smoothing::None,
            ..BleuConfig::default()
        };
        let score = score_bleu(
            "AI is artificial intelligence.",
            "Artificial intelligence is AI.",
            &config,
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_epsilon_smoothing_positive() {
        let config = BleuConfig {
            smoothing: Smoothing::Epsilon,
            ..BleuConfig::default()
        };
        let score = score_bleu("a b c d", "d c b a", &config);
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn test_short_response_penalized() {
        let full = score_bleu("the cat sat on the mat", "the cat sat on the mat", &BleuConfig::default());
        let short = score_bleu("the cat sat", "the cat sat on the mat", &BleuConfig::default());
        assert!(short < full);
        assert!((brevity_penalty(3, 6) - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_single_token_response_uses_unigrams_only() {
        let score = score_bleu("paris", "paris", &BleuConfig::default());
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(score_bleu("", "reference", &BleuConfig::default()), 0.0);
        assert_eq!(score_bleu("candidate", "", &BleuConfig::default()), 0.0);
    }

    #[test]
    fn test_bad_weights_fall_back_to_uniform() {
        let config = BleuConfig {
            weights: vec![1.0, -1.0],
            ..BleuConfig::default()
        };
        assert_eq!(config.order_weights(), vec![0.25; 4]);

        let custom = BleuConfig {
            max_order: 2,
            weights: vec![0.7, 0.3],
            ..BleuConfig::default()
        };
        assert_eq!(custom.order_weights(), vec![0.7, 0.3]);
    }
}
