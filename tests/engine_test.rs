use async_trait::async_trait;
use rag_metrics::dataset::ErrorCode;
use rag_metrics::encoder::{Encoder, EncoderError};
use rag_metrics::error::MetricsError;
use rag_metrics::metrics::engine::MetricsEngine;
use rag_metrics::metrics::{CalculationRequest, MetricType};
use rag_metrics::settings::EngineSettings;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// ============================================================================
// Stub encoders
// ============================================================================

/// Texts containing "yes" embed to one axis, everything else to the other.
struct AxisEncoder;

#[async_trait]
impl Encoder for AxisEncoder {
    fn name(&self) -> &str {
        "axis"
    }

    fn dimension(&self) -> usize {
        2
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        Ok(texts
            .iter()
            .map(|t| {
                if t.contains("yes") {
                    vec![1.0, 0.0]
                } else {
                    vec![0.0, 1.0]
                }
            })
            .collect())
    }
}

/// Fails any batch containing the word "poison".
struct PoisonEncoder;

#[async_trait]
impl Encoder for PoisonEncoder {
    fn name(&self) -> &str {
        "poison"
    }

    fn dimension(&self) -> usize {
        2
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.iter().any(|t| t.contains("poison")) {
            return Err(EncoderError::Unavailable("model refused input".to_string()));
        }
        Ok(texts.iter().map(|_| vec![1.0, 1.0]).collect())
    }
}

/// Stalls on batches containing "slow" and answers the rest at once.
struct SlowEncoder;

#[async_trait]
impl Encoder for SlowEncoder {
    fn name(&self) -> &str {
        "slow"
    }

    fn dimension(&self) -> usize {
        2
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.iter().any(|t| t.contains("slow")) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(texts.iter().map(|_| vec![0.0, 1.0]).collect())
    }
}

/// Never answers.
struct StuckEncoder;

#[async_trait]
impl Encoder for StuckEncoder {
    fn name(&self) -> &str {
        "stuck"
    }

    fn dimension(&self) -> usize {
        2
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        std::future::pending().await
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn settings() -> EngineSettings {
    EngineSettings {
        batch_size: 1,
        workers: 2,
        ..EngineSettings::default()
    }
}

fn request(rows: Value, metrics: &[&str]) -> CalculationRequest {
    let data = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_object().cloned().unwrap())
        .collect();
    CalculationRequest {
        data,
        metric_types: if metrics.is_empty() {
            None
        } else {
            Some(metrics.iter().map(|m| m.to_string()).collect())
        },
        ..CalculationRequest::default()
    }
}

fn no_stop() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_full_calculation_with_default_encoder() {
    let engine = MetricsEngine::from_settings(EngineSettings::default()).unwrap();
    let req = request(
        json!([
            {"query": "What is AI?", "response": "AI is artificial intelligence.", "groundTruth": "Artificial intelligence is AI."},
            {"query": "Capital of France?", "response": "The capital of France is Paris.", "groundTruth": "The capital of France is Paris."},
        ]),
        &[],
    );

    let result = engine.calculate(&req, no_stop()).await.unwrap();

    assert_eq!(result.per_query_metrics.len(), 2);
    assert_eq!(result.metric_types, MetricType::ALL.to_vec());
    assert!(result.calculation_time > 0.0);
    assert!(!result.id.is_empty());
    assert!(!result.dataset_id.is_empty());

    let first = &result.per_query_metrics[0];
    assert_eq!(first.row_index, 1);
    assert_eq!(first.query, "What is AI?");
    assert_eq!(first.exact_match, Some(0.0));
    assert!(first.f1_score > 0.8);
    assert!(first.bleu_score.unwrap() > 0.0);

    let second = &result.per_query_metrics[1];
    assert_eq!(second.exact_match, Some(1.0));
    assert!((second.semantic_similarity - 1.0).abs() < 1e-6);

    let agg = &result.aggregate_metrics;
    assert_eq!(agg.exact_match_rate, Some(0.5));
    for value in [agg.precision, agg.recall, agg.f1_score, agg.semantic_similarity] {
        assert!((0.0..=1.0).contains(&value));
    }
    assert!(agg.rouge_score.as_ref().unwrap().contains_key("rougeL"));
}

#[tokio::test]
async fn test_opposite_rows_average_to_half() {
    let engine = MetricsEngine::new(settings(), Arc::new(AxisEncoder));
    let req = request(
        json!([
            {"query": "q1", "response": "yes", "groundTruth": "yes"},
            {"query": "q2", "response": "yes", "groundTruth": "no"},
        ]),
        &["semanticSimilarity", "exactMatch"],
    );

    let result = engine.calculate(&req, no_stop()).await.unwrap();
    let agg = &result.aggregate_metrics;

    assert_eq!(result.per_query_metrics[0].semantic_similarity, 1.0);
    assert_eq!(result.per_query_metrics[1].semantic_similarity, 0.0);
    assert!((agg.semantic_similarity - 0.5).abs() < 1e-12);
    assert_eq!(agg.exact_match_rate, Some(0.5));
    // Lexical metrics were not requested.
    assert_eq!(agg.f1_score, 0.0);
    assert!(agg.bleu_score.is_none());
    assert!(agg.rouge_score.is_none());
}

#[tokio::test]
async fn test_failed_batch_only_affects_its_rows() {
    let engine = MetricsEngine::new(settings(), Arc::new(PoisonEncoder));
    let req = request(
        json!([
            {"query": "q1", "response": "fine answer", "groundTruth": "fine answer"},
            {"query": "q2", "response": "poison answer", "groundTruth": "fine answer"},
            {"query": "q3", "response": "another answer", "groundTruth": "another answer"},
        ]),
        &["semanticSimilarity", "f1Score"],
    );

    let result = engine.calculate(&req, no_stop()).await.unwrap();
    let rows = &result.per_query_metrics;

    assert!(!rows[0].semantic_similarity_failed);
    assert!(rows[1].semantic_similarity_failed);
    assert_eq!(rows[1].semantic_similarity, 0.0);
    assert!(rows[1]
        .issues
        .as_ref()
        .unwrap()
        .iter()
        .any(|i| i.starts_with("semantic similarity unavailable")));
    // Lexical scoring still ran for the failed row.
    assert!(rows[1].f1_score > 0.0);
    assert!(!rows[2].semantic_similarity_failed);

    // The failed row is left out of the semantic mean.
    assert!((result.aggregate_metrics.semantic_similarity - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_all_rows_failing_is_processing_error() {
    let engine = MetricsEngine::new(settings(), Arc::new(PoisonEncoder));
    let req = request(
        json!([
            {"query": "q1", "response": "poison one", "groundTruth": "x"},
            {"query": "q2", "response": "poison two", "groundTruth": "y"},
        ]),
        &["semanticSimilarity"],
    );

    let err = engine.calculate(&req, no_stop()).await.unwrap_err();
    assert!(matches!(err, MetricsError::Processing { .. }));
    assert_eq!(err.code(), "PROCESSING_ERROR");
}

#[tokio::test]
async fn test_encoder_timeout_fails_only_slow_batch() {
    let engine = MetricsEngine::new(
        EngineSettings {
            encoder_timeout: Duration::from_millis(50),
            ..settings()
        },
        Arc::new(SlowEncoder),
    );
    let req = request(
        json!([
            {"query": "q1", "response": "quick reply", "groundTruth": "quick reply"},
            {"query": "q2", "response": "slow reply", "groundTruth": "quick reply"},
        ]),
        &["semanticSimilarity"],
    );

    let result = tokio::time::timeout(Duration::from_secs(10), engine.calculate(&req, no_stop()))
        .await
        .expect("calculation should not wait on the stalled batch")
        .unwrap();

    let rows = &result.per_query_metrics;
    assert!(!rows[0].semantic_similarity_failed);
    assert!(rows[1].semantic_similarity_failed);
    assert!(rows[1]
        .issues
        .as_ref()
        .unwrap()
        .iter()
        .any(|i| i.contains("timed out")));
}

#[tokio::test]
async fn test_stop_signal_cancels_calculation() {
    let engine = MetricsEngine::new(
        EngineSettings {
            encoder_timeout: Duration::from_secs(60),
            ..settings()
        },
        Arc::new(StuckEncoder),
    );
    let req = request(
        json!([{"query": "q", "response": "r", "groundTruth": "g"}]),
        &["semanticSimilarity"],
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = stop_tx.send(true);
    });

    let err = tokio::time::timeout(Duration::from_secs(10), engine.calculate(&req, stop_rx))
        .await
        .expect("cancellation should end the calculation")
        .unwrap_err();
    assert!(matches!(err, MetricsError::Cancelled));
}

#[tokio::test]
async fn test_unknown_metric_type_rejected() {
    let engine = MetricsEngine::new(settings(), Arc::new(AxisEncoder));
    let req = request(
        json!([{"query": "q", "response": "r", "groundTruth": "g"}]),
        &["f1Score", "perplexity"],
    );

    match engine.calculate(&req, no_stop()).await {
        Err(MetricsError::Validation(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].code, ErrorCode::UnknownMetricType);
        }
        other => panic!("expected validation error, got {:?}", other.map(|r| r.id)),
    }
}

#[tokio::test]
async fn test_validation_and_metric_errors_reported_together() {
    let engine = MetricsEngine::new(settings(), Arc::new(AxisEncoder));
    let req = request(
        json!([{"query": "q", "response": "", "groundTruth": "g"}]),
        &["nonsense"],
    );

    let Err(MetricsError::Validation(errors)) = engine.calculate(&req, no_stop()).await else {
        panic!("expected validation error");
    };
    assert!(errors.iter().any(|e| e.code == ErrorCode::EmptyValue));
    assert!(errors.iter().any(|e| e.code == ErrorCode::UnknownMetricType));
}

#[tokio::test]
async fn test_subset_only_computes_requested() {
    let engine = MetricsEngine::new(settings(), Arc::new(StuckEncoder));
    let req = request(
        json!([{"query": "q", "response": "the cat sat", "groundTruth": "the cat sat down"}]),
        &["bleu", "rouge"],
    );

    // Semantic similarity is not requested, so the stuck encoder is never called.
    let result = engine.calculate(&req, no_stop()).await.unwrap();
    let row = &result.per_query_metrics[0];

    assert_eq!(result.metric_types, vec![MetricType::Bleu, MetricType::Rouge]);
    assert!(row.bleu_score.is_some());
    assert!(row.rouge_score.is_some());
    assert!(row.exact_match.is_none());
    assert_eq!(row.precision, 0.0);
    assert_eq!(row.semantic_similarity, 0.0);
    assert!(!row.semantic_similarity_failed);
    assert!(result.aggregate_metrics.exact_match_rate.is_none());
}

#[tokio::test]
async fn test_default_metrics_used_when_request_names_none() {
    let engine = MetricsEngine::new(settings(), Arc::new(StuckEncoder))
        .with_default_metrics(vec![MetricType::ExactMatch]);
    let req = request(
        json!([{"query": "q", "response": "Same", "groundTruth": "same"}]),
        &[],
    );

    let result = engine.calculate(&req, no_stop()).await.unwrap();
    assert_eq!(result.metric_types, vec![MetricType::ExactMatch]);
    assert_eq!(result.aggregate_metrics.exact_match_rate, Some(1.0));
}

#[tokio::test]
async fn test_per_query_metrics_in_row_order() {
    let engine = MetricsEngine::new(
        EngineSettings {
            workers: 4,
            ..settings()
        },
        Arc::new(AxisEncoder),
    );
    let rows: Vec<Value> = (0..25)
        .map(|i| {
            json!({
                "query": format!("question {}", i),
                "response": format!("answer number {}", i),
                "groundTruth": format!("answer {}", i),
            })
        })
        .collect();
    let req = request(Value::Array(rows), &[]);

    let result = engine.calculate(&req, no_stop()).await.unwrap();
    let indices: Vec<usize> = result.per_query_metrics.iter().map(|m| m.row_index).collect();
    assert_eq!(indices, (1..=25).collect::<Vec<_>>());
    assert_eq!(result.per_query_metrics[7].query, "question 7");
}

#[tokio::test]
async fn test_validate_reports_detected_mapping() {
    let engine = MetricsEngine::new(settings(), Arc::new(AxisEncoder));
    let req = request(
        json!([
            {"question": "q1", "answer_generated": "r1", "answer": "g1"},
            {"question": "q2", "answer_generated": "r2", "answer": "g2"},
        ]),
        &[],
    );

    let report = engine.validate(&req).unwrap();
    assert!(report.valid);
    assert_eq!(report.row_count, 2);
    assert_eq!(report.preview.len(), 2);
    let mapping = report.detected_mappings.unwrap();
    assert_eq!(mapping.query, "question");
    assert_eq!(mapping.response, "answer_generated");
    assert_eq!(mapping.ground_truth, "answer");
}

#[tokio::test]
async fn test_calculation_runs_on_spawned_task() {
    let engine = Arc::new(MetricsEngine::from_settings(settings()).unwrap());
    let req = request(
        json!([
            {"query": "q1", "response": "the cat sat", "groundTruth": "the cat sat"},
            {"query": "q2", "response": "a dog ran", "groundTruth": "the dog ran"},
            {"query": "q3", "response": "birds fly high", "groundTruth": "birds fly"},
        ]),
        &["semanticSimilarity"],
    );

    let task_engine = Arc::clone(&engine);
    let result = tokio::spawn(async move { task_engine.calculate(&req, no_stop()).await })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.per_query_metrics.len(), 3);
    assert!(result.per_query_metrics[0].semantic_similarity > 0.99);
    assert!(result.aggregate_metrics.semantic_similarity > 0.0);
}
