pub mod aggregate;
pub mod bleu;
pub mod engine;
pub mod evaluator;
pub mod lexical;
pub mod rouge;
pub mod semantic;
pub mod tokenize;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::config::{DEFAULT_DRIFT_THRESHOLD, DEFAULT_MIN_TOKENS};
use crate::dataset::{ColumnMappingRequest, ErrorCode, RawRow, ValidationError};
use bleu::BleuConfig;
use rouge::RougeConfig;

// ============================================================================
// Metric selection
// ============================================================================

/// Declaration order is the canonical reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricType {
    Precision,
    Recall,
    F1Score,
    SemanticSimilarity,
    Bleu,
    Rouge,
    ExactMatch,
}

impl MetricType {
    pub const ALL: [MetricType; 7] = [
        MetricType::Precision,
        MetricType::Recall,
        MetricType::F1Score,
        MetricType::SemanticSimilarity,
        MetricType::Bleu,
        MetricType::Rouge,
        MetricType::ExactMatch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetricType::Precision => "precision",
            MetricType::Recall => "recall",
            MetricType::F1Score => "f1Score",
            MetricType::SemanticSimilarity => "semanticSimilarity",
            MetricType::Bleu => "bleu",
            MetricType::Rouge => "rouge",
            MetricType::ExactMatch => "exactMatch",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect();
        match key.as_str() {
            "precision" => Ok(MetricType::Precision),
            "recall" => Ok(MetricType::Recall),
            "f1" | "f1score" => Ok(MetricType::F1Score),
            "semantic" | "semanticsimilarity" | "similarity" => {
                Ok(MetricType::SemanticSimilarity)
            }
            "bleu" | "bleuscore" => Ok(MetricType::Bleu),
            "rouge" | "rougescore" | "rougel" => Ok(MetricType::Rouge),
            "exactmatch" | "exactmatchrate" | "em" => Ok(MetricType::ExactMatch),
            _ => Err(format!("Unknown metric type '{}'", s)),
        }
    }
}

impl Serialize for MetricType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for MetricType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelection(BTreeSet<MetricType>);

impl Default for MetricSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl MetricSelection {
    pub fn all() -> Self {
        Self(MetricType::ALL.into_iter().collect())
    }

    pub fn only(types: impl IntoIterator<Item = MetricType>) -> Self {
        Self(types.into_iter().collect())
    }

    /// Parse requested names. An absent or empty list means every metric.
    pub fn from_names(names: Option<&[String]>) -> Result<Self, Vec<ValidationError>> {
        let Some(names) = names.filter(|n| !n.is_empty()) else {
            return Ok(Self::all());
        };

        let mut selected = BTreeSet::new();
        let mut errors = Vec::new();
        for name in names {
            match name.parse::<MetricType>() {
                Ok(metric) => {
                    selected.insert(metric);
                }
                Err(message) => errors.push(ValidationError::error(
                    ErrorCode::UnknownMetricType,
                    message,
                )),
            }
        }

        if errors.is_empty() {
            Ok(Self(selected))
        } else {
            Err(errors)
        }
    }

    pub fn contains(&self, metric: MetricType) -> bool {
        self.0.contains(&metric)
    }

    /// Precision, recall and F1 share one token intersection.
    pub fn wants_lexical(&self) -> bool {
        self.contains(MetricType::Precision)
            || self.contains(MetricType::Recall)
            || self.contains(MetricType::F1Score)
    }

    pub fn types(&self) -> Vec<MetricType> {
        self.0.iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Scoring configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringConfig {
    pub bleu: BleuConfig,
    pub rouge: RougeConfig,
    /// Responses or ground truths with fewer tokens are flagged.
    pub min_tokens: usize,
    /// Flag rows where lexical F1 exceeds semantic similarity by more than this.
    pub drift_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            bleu: BleuConfig::default(),
            rouge: RougeConfig::default(),
            min_tokens: DEFAULT_MIN_TOKENS,
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
        }
    }
}

// ============================================================================
// Request / result model
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRequest {
    #[serde(default)]
    pub dataset_id: Option<String>,
    /// Header list; when absent it is inferred from the row keys.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    pub data: Vec<RawRow>,
    #[serde(default, alias = "columnMapping")]
    pub column_mappings: ColumnMappingRequest,
    #[serde(default)]
    pub row_count: Option<usize>,
    #[serde(default)]
    pub metric_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetrics {
    pub row_index: usize,
    pub query: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub semantic_similarity: f64,
    pub response_length: usize,
    pub ground_truth_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bleu_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rouge_score: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_match: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<String>>,
    /// Set when the encoder failed for this row; `semantic_similarity` is 0
    /// and excluded from the aggregate mean.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub semantic_similarity_failed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub semantic_similarity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bleu_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rouge_score: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_match_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricResult {
    pub id: String,
    pub dataset_id: String,
    pub calculation_timestamp: String,
    pub aggregate_metrics: AggregateMetrics,
    pub per_query_metrics: Vec<QueryMetrics>,
    /// Seconds.
    pub calculation_time: f64,
    pub metric_types: Vec<MetricType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationError>,
}

/// Keep a score inside [0, 1]; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_type_aliases() {
        assert_eq!("F1".parse::<MetricType>(), Ok(MetricType::F1Score));
        assert_eq!("f1_score".parse::<MetricType>(), Ok(MetricType::F1Score));
        assert_eq!("exactMatchRate".parse::<MetricType>(), Ok(MetricType::ExactMatch));
        assert_eq!("ROUGE-L".parse::<MetricType>(), Ok(MetricType::Rouge));
        assert!("perplexity".parse::<MetricType>().is_err());
    }

    #[test]
    fn test_selection_defaults_to_all() {
        assert_eq!(MetricSelection::from_names(None).unwrap(), MetricSelection::all());
        let empty: Vec<String> = Vec::new();
        assert_eq!(
            MetricSelection::from_names(Some(empty.as_slice())).unwrap(),
            MetricSelection::all()
        );
    }

    #[test]
    fn test_selection_reports_unknown_names() {
        let names = vec!["bleu".to_string(), "meteor".to_string()];
        let errors = MetricSelection::from_names(Some(names.as_slice())).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::UnknownMetricType);
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(1.5), 1.0);
        assert_eq!(clamp_unit(0.25), 0.25);
    }
}
