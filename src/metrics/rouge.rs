//! Recall-oriented overlap: ROUGE-L (LCS recall) and ROUGE-N recall.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::clamp_unit;
use super::tokenize::{clipped_overlap, ngram_counts, tokenize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RougeVariant {
    #[serde(rename = "rougeL")]
    RougeL,
    #[serde(rename = "rouge1")]
    Rouge1,
    #[serde(rename = "rouge2")]
    Rouge2,
}

impl RougeVariant {
    pub fn key(self) -> &'static str {
        match self {
            RougeVariant::RougeL => "rougeL",
            RougeVariant::Rouge1 => "rouge1",
            RougeVariant::Rouge2 => "rouge2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RougeConfig {
    pub variants: Vec<RougeVariant>,
}

impl Default for RougeConfig {
    fn default() -> Self {
        Self {
            variants: vec![RougeVariant::RougeL, RougeVariant::Rouge1, RougeVariant::Rouge2],
        }
    }
}

impl RougeConfig {
    /// Configured variants, or ROUGE-L alone when the list is empty.
    pub fn effective_variants(&self) -> Vec<RougeVariant> {
        if self.variants.is_empty() {
            vec![RougeVariant::RougeL]
        } else {
            self.variants.clone()
        }
    }
}

/// LCS length over truth length.
pub fn rouge_l(response: &[String], ground_truth: &[String]) -> f64 {
    if response.is_empty() || ground_truth.is_empty() {
        return 0.0;
    }
    clamp_unit(lcs_length(response, ground_truth) as f64 / ground_truth.len() as f64)
}

/// Clipped n-gram recall against the ground truth.
pub fn rouge_n(response: &[String], ground_truth: &[String], n: usize) -> f64 {
    let reference = ngram_counts(ground_truth, n);
    let total: usize = reference.values().sum();
    if total == 0 {
        return 0.0;
    }
    let overlap = clipped_overlap(&ngram_counts(response, n), &reference);
    clamp_unit(overlap as f64 / total as f64)
}

/// Every configured variant keyed by its sub-metric name.
pub fn rouge_scores(
    response: &[String],
    ground_truth: &[String],
    config: &RougeConfig,
) -> BTreeMap<String, f64> {
    config
        .effective_variants()
        .into_iter()
        .map(|variant| {
            let score = match variant {
                RougeVariant::RougeL => rouge_l(response, ground_truth),
                RougeVariant::Rouge1 => rouge_n(response, ground_truth, 1),
                RougeVariant::Rouge2 => rouge_n(response, ground_truth, 2),
            };
            (variant.key().to_string(), score)
        })
        .collect()
}

/// Tokenizing convenience wrapper around [`rouge_scores`].
pub fn score_rouge(response: &str, ground_truth: &str, config: &RougeConfig) -> BTreeMap<String, f64> {
    rouge_scores(&tokenize(response), &tokenize(ground_truth), config)
}

/// Longest common subsequence length, O(min(m, n)) memory.
pub fn lcs_length(a: &[String], b: &[String]) -> usize {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];

    for x in long {
        for (j, y) in short.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}
