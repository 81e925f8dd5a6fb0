use std::collections::BTreeMap;

use super::{clamp_unit, AggregateMetrics, MetricSelection, MetricType, QueryMetrics};
use crate::error::MetricsError;

/// Reduce per-row records into dataset-level means.
///
/// Fails on an empty input, and when semantic similarity was requested but
/// no row produced one.
pub fn aggregate(
    records: &[QueryMetrics],
    selection: &MetricSelection,
) -> Result<AggregateMetrics, MetricsError> {
    if records.is_empty() {
        return Err(MetricsError::processing(
            "No metrics computable on zero rows",
            "aggregate called with an empty record list",
        ));
    }

    let semantic_scores: Vec<f64> = records
        .iter()
        .filter(|r| !r.semantic_similarity_failed)
        .map(|r| r.semantic_similarity)
        .collect();
    let semantic_similarity = if selection.contains(MetricType::SemanticSimilarity) {
        if semantic_scores.is_empty() {
            return Err(MetricsError::processing(
                "Semantic similarity could not be computed for any row",
                format!("encoder failed for all {} rows", records.len()),
            ));
        }
        mean(semantic_scores.iter().copied())
    } else {
        0.0
    };

    let bleu_score = selection
        .contains(MetricType::Bleu)
        .then(|| mean(records.iter().map(|r| r.bleu_score.unwrap_or(0.0))));

    let rouge_score = selection.contains(MetricType::Rouge).then(|| {
        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        for scores in records.iter().filter_map(|r| r.rouge_score.as_ref()) {
            for (key, value) in scores {
                *sums.entry(key.clone()).or_insert(0.0) += value;
            }
        }
        sums.into_iter()
            .map(|(key, sum)| (key, clamp_unit(sum / records.len() as f64)))
            .collect::<BTreeMap<_, _>>()
    });

    let exact_match_rate = selection.contains(MetricType::ExactMatch).then(|| {
        let matches = records
            .iter()
            .filter(|r| r.exact_match == Some(1.0))
            .count();
        matches as f64 / records.len() as f64
    });

    Ok(AggregateMetrics {
        precision: mean(records.iter().map(|r| r.precision)),
        recall: mean(records.iter().map(|r| r.recall)),
        f1_score: mean(records.iter().map(|r| r.f1_score)),
        semantic_similarity,
        bleu_score,
        rouge_score,
        exact_match_rate,
    })
}

/// Mean of a non-empty sequence, clamped to [0, 1]; 0 for an empty one.
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        clamp_unit(sum / count as f64)
    }
}
