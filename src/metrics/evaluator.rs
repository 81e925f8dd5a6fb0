use super::bleu::bleu;
use super::lexical::{exact_match, lexical_scores, LexicalScores};
use super::rouge::rouge_scores;
use super::semantic::SemanticOutcome;
use super::tokenize::tokenize;
use super::{clamp_unit, MetricSelection, MetricType, QueryMetrics, ScoringConfig};
use crate::dataset::DataRow;

/// Apply the selected scorers to one row.
///
/// Semantic similarity arrives precomputed because embeddings are batched
/// across rows by the engine. Issues are informational only.
pub fn evaluate_row(
    row: &DataRow,
    selection: &MetricSelection,
    semantic: SemanticOutcome,
    config: &ScoringConfig,
) -> QueryMetrics {
    let response_tokens = tokenize(row.response());
    let truth_tokens = tokenize(row.ground_truth());
    let mut issues = Vec::new();

    let lexical = if selection.wants_lexical() {
        lexical_scores(&response_tokens, &truth_tokens)
    } else {
        LexicalScores::default()
    };

    let (semantic_similarity, semantic_failed) = match semantic {
        SemanticOutcome::Scored(score) => (clamp_unit(score), false),
        SemanticOutcome::NotRequested => (0.0, false),
        SemanticOutcome::Failed(reason) => {
            issues.push(format!("semantic similarity unavailable: {}", reason));
            (0.0, true)
        }
    };

    let bleu_score = selection
        .contains(MetricType::Bleu)
        .then(|| bleu(&response_tokens, &truth_tokens, &config.bleu));
    let rouge_score = selection
        .contains(MetricType::Rouge)
        .then(|| rouge_scores(&response_tokens, &truth_tokens, &config.rouge));
    let exact = selection
        .contains(MetricType::ExactMatch)
        .then(|| exact_match(row.response(), row.ground_truth()));

    push_length_issue(&mut issues, "response", response_tokens.len(), config.min_tokens);
    push_length_issue(&mut issues, "ground truth", truth_tokens.len(), config.min_tokens);

    let semantic_scored = selection.contains(MetricType::SemanticSimilarity) && !semantic_failed;
    if semantic_scored
        && selection.wants_lexical()
        && lexical.f1 - semantic_similarity > config.drift_threshold
    {
        issues.push(format!(
            "semantic similarity far below lexical F1 ({:.2} vs {:.2})",
            semantic_similarity, lexical.f1
        ));
    }

    QueryMetrics {
        row_index: row.row_index(),
        query: row.query().to_string(),
        precision: lexical.precision,
        recall: lexical.recall,
        f1_score: lexical.f1,
        semantic_similarity,
        response_length: row.response().chars().count(),
        ground_truth_length: row.ground_truth().chars().count(),
        bleu_score,
        rouge_score,
        exact_match: exact,
        issues: if issues.is_empty() { None } else { Some(issues) },
        semantic_similarity_failed: semantic_failed,
    }
}

fn push_length_issue(issues: &mut Vec<String>, what: &str, tokens: usize, min_tokens: usize) {
    if tokens == 0 {
        issues.push(format!("empty {}", what));
    } else if tokens < min_tokens {
        issues.push(format!("short {} ({} tokens)", what, tokens));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(response: &str, truth: &str) -> DataRow {
        DataRow::new(
            1,
            "q".to_string(),
            response.to_string(),
            truth.to_string(),
            None,
        )
    }

    #[test]
    fn test_all_metrics_present() {
        let metrics = evaluate_row(
            &row("the cat sat on the mat", "the cat sat on the mat"),
            &MetricSelection::all(),
            SemanticOutcome::Scored(0.9),
            &ScoringConfig::default(),
        );
        assert_eq!(metrics.f1_score, 1.0);
        assert_eq!(metrics.exact_match, Some(1.0));
        assert!(metrics.bleu_score.is_some());
        assert!(metrics.rouge_score.is_some());
        assert_eq!(metrics.semantic_similarity, 0.9);
        assert!(metrics.issues.is_none());
    }

    #[test]
    fn test_unselected_metrics_absent() {
        let metrics = evaluate_row(
            &row("a b c", "a b c"),
            &MetricSelection::only([MetricType::Bleu]),
            SemanticOutcome::NotRequested,
            &ScoringConfig::default(),
        );
        assert_eq!(metrics.f1_score, 0.0);
        assert!(metrics.rouge_score.is_none());
        assert!(metrics.exact_match.is_none());
        assert!(metrics.bleu_score.is_some());
    }

    #[test]
    fn test_short_and_drift_issues() {
        let metrics = evaluate_row(
            &row("yes", "yes"),
            &MetricSelection::all(),
            SemanticOutcome::Scored(0.1),
            &ScoringConfig::default(),
        );
        let issues = metrics.issues.unwrap();
        assert!(issues.contains(&"short response (1 tokens)".to_string()));
        assert!(issues.contains(&"short ground truth (1 tokens)".to_string()));
        assert!(issues.iter().any(|i| i.starts_with("semantic similarity far below")));
    }

    #[test]
    fn test_failed_semantic_recorded() {
        let metrics = evaluate_row(
            &row("one two three", "one two three"),
            &MetricSelection::all(),
            SemanticOutcome::Failed("timeout".to_string()),
            &ScoringConfig::default(),
        );
        assert!(metrics.semantic_similarity_failed);
        assert_eq!(metrics.semantic_similarity, 0.0);
        assert_eq!(
            metrics.issues,
            Some(vec!["semantic similarity unavailable: timeout".to_string()])
        );
    }

    #[test]
    fn test_punctuation_only_response_is_empty_issue() {
        let metrics = evaluate_row(
            &row("...", "a real answer"),
            &MetricSelection::all(),
            SemanticOutcome::NotRequested,
            &ScoringConfig::default(),
        );
        assert_eq!(metrics.precision, 0.0);
        assert!(metrics.issues.unwrap().contains(&"empty response".to_string()));
    }
}
