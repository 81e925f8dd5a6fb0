use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::aggregate::aggregate;
use super::evaluator::evaluate_row;
use super::semantic::{cosine_similarity, SemanticOutcome};
use super::{CalculationRequest, MetricResult, MetricSelection, MetricType, QueryMetrics};
use crate::config::PREVIEW_ROWS;
use crate::dataset::mapping::detect_mapping;
use crate::dataset::validate::{infer_headers, validate_rows};
use crate::dataset::{ColumnMapping, DataRow, RawRow, ValidatedDataset, ValidationError};
use crate::encoder::{build_encoder, Encoder, EncoderError};
use crate::error::MetricsError;
use crate::settings::EngineSettings;

/// Outcome of a dry-run validation, without scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub detected_mappings: Option<ColumnMapping>,
    pub preview: Vec<RawRow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationError>,
}

/// Runs one calculation per call: validate, embed, score in parallel, join,
/// aggregate. Holds no per-calculation state, so one engine can serve
/// concurrent requests.
pub struct MetricsEngine {
    settings: EngineSettings,
    encoder: Arc<dyn Encoder>,
    default_metrics: Option<MetricSelection>,
}

impl MetricsEngine {
    pub fn new(settings: EngineSettings, encoder: Arc<dyn Encoder>) -> Self {
        Self {
            settings,
            encoder,
            default_metrics: None,
        }
    }

    /// Build the encoder named in `settings`.
    pub fn from_settings(settings: EngineSettings) -> Result<Self, MetricsError> {
        let encoder = build_encoder(&settings.encoder, settings.encoder_timeout)?;
        Ok(Self::new(settings, encoder))
    }

    /// Metrics used when a request names none.
    pub fn with_default_metrics(mut self, types: Vec<MetricType>) -> Self {
        if !types.is_empty() {
            self.default_metrics = Some(MetricSelection::only(types));
        }
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    fn headers(request: &CalculationRequest) -> Vec<String> {
        match &request.columns {
            Some(columns) if !columns.is_empty() => columns.clone(),
            _ => infer_headers(&request.data),
        }
    }

    /// Resolve the metric selection and validate rows. Errors from both
    /// steps are reported together.
    pub fn prepare(
        &self,
        request: &CalculationRequest,
    ) -> Result<(ValidatedDataset, MetricSelection), MetricsError> {
        let requested = request.metric_types.as_deref().filter(|names| !names.is_empty());
        let selection = match (requested, &self.default_metrics) {
            (None, Some(defaults)) => Ok(defaults.clone()),
            (names, _) => MetricSelection::from_names(names),
        };

        let headers = Self::headers(request);
        let dataset = validate_rows(
            &headers,
            &request.data,
            &request.column_mappings,
            request.row_count,
            &self.settings.synonyms,
            &self.settings.limits,
        );

        match (dataset, selection) {
            (Ok(dataset), Ok(selection)) => Ok((dataset, selection)),
            (Ok(_), Err(errors)) => Err(MetricsError::Validation(errors)),
            (Err(errors), Ok(_)) => Err(MetricsError::Validation(errors)),
            (Err(mut errors), Err(more)) => {
                errors.extend(more);
                Err(MetricsError::Validation(errors))
            }
        }
    }

    /// Check a request without scoring it.
    pub fn validate(&self, request: &CalculationRequest) -> Result<ValidationReport, MetricsError> {
        let headers = Self::headers(request);
        let (dataset, _) = self.prepare(request)?;
        let detected = detect_mapping(&headers, &self.settings.synonyms);

        Ok(ValidationReport {
            valid: true,
            row_count: dataset.rows.len(),
            detected_mappings: detected.or(Some(dataset.mapping)),
            columns: headers,
            preview: request.data.iter().take(PREVIEW_ROWS).cloned().collect(),
            warnings: dataset.warnings,
        })
    }

    /// Score every row and aggregate. Flipping `stop_rx` to `true` cancels
    /// outstanding embedding and scoring work.
    pub async fn calculate(
        &self,
        request: &CalculationRequest,
        stop_rx: watch::Receiver<bool>,
    ) -> Result<MetricResult, MetricsError> {
        let started = Instant::now();
        let (dataset, selection) = self.prepare(request)?;
        let ValidatedDataset { rows, warnings, .. } = dataset;

        for warning in &warnings {
            warn!("Dataset warning: {}", warning);
        }
        info!(
            "Calculating {} metric types over {} rows",
            selection.types().len(),
            rows.len()
        );

        let semantic = if selection.contains(MetricType::SemanticSimilarity) {
            tokio::select! {
                outcomes = self.embed_rows(&rows) => outcomes,
                _ = wait_for_stop(stop_rx.clone()) => {
                    info!("Calculation cancelled during embedding");
                    return Err(MetricsError::Cancelled);
                }
            }
        } else {
            vec![SemanticOutcome::NotRequested; rows.len()]
        };

        let mut records = self.score_rows(rows, semantic, &selection, stop_rx).await?;
        records.sort_by_key(|r| r.row_index);

        let aggregate_metrics = aggregate(&records, &selection)?;
        let calculation_time = started.elapsed().as_secs_f64().max(1e-6);

        info!(
            "Calculated metrics for {} rows in {:.3}s",
            records.len(),
            calculation_time
        );

        Ok(MetricResult {
            id: uuid::Uuid::new_v4().to_string(),
            dataset_id: request
                .dataset_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            calculation_timestamp: Utc::now().to_rfc3339(),
            aggregate_metrics,
            per_query_metrics: records,
            calculation_time,
            metric_types: selection.types(),
            warnings,
        })
    }

    /// One semantic outcome per row, in row order. A failed or timed-out
    /// batch fails only its own rows.
    async fn embed_rows(&self, rows: &[DataRow]) -> Vec<SemanticOutcome> {
        let timeout = self.settings.encoder_timeout;

        // Batch futures own their texts and encoder handle; borrowing rows
        // here makes the calculation future non-`Send`.
        let batches: Vec<_> = rows
            .chunks(self.settings.batch_size.max(1))
            .enumerate()
            .map(|(batch_index, batch)| {
                let texts: Vec<String> = batch
                    .iter()
                    .map(|r| r.response().to_string())
                    .chain(batch.iter().map(|r| r.ground_truth().to_string()))
                    .collect();
                let encoder = Arc::clone(&self.encoder);
                embed_batch(encoder, texts, batch.len(), batch_index, timeout)
            })
            .collect();

        let mut done: Vec<(usize, Vec<SemanticOutcome>)> = stream::iter(batches)
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;
        done.sort_by_key(|(batch_index, _)| *batch_index);
        done.into_iter().flat_map(|(_, outcomes)| outcomes).collect()
    }

    /// Score rows on blocking worker threads and wait for all of them.
    async fn score_rows(
        &self,
        rows: Vec<DataRow>,
        semantic: Vec<SemanticOutcome>,
        selection: &MetricSelection,
        stop_rx: watch::Receiver<bool>,
    ) -> Result<Vec<QueryMetrics>, MetricsError> {
        let total = rows.len();
        let chunk_size = total.div_ceil(self.settings.workers.max(1)).max(1);
        let mut pending = rows.into_iter().zip(semantic).peekable();
        let mut workers = JoinSet::new();

        while pending.peek().is_some() {
            let chunk: Vec<(DataRow, SemanticOutcome)> = pending.by_ref().take(chunk_size).collect();
            let selection = selection.clone();
            let config = self.settings.scoring.clone();
            workers.spawn_blocking(move || {
                chunk
                    .into_iter()
                    .map(|(row, outcome)| evaluate_row(&row, &selection, outcome, &config))
                    .collect::<Vec<_>>()
            });
        }
        debug!("Scoring {} rows on {} workers", total, workers.len());

        let mut records = Vec::with_capacity(total);
        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    Some(Ok(chunk)) => records.extend(chunk),
                    Some(Err(e)) => {
                        workers.abort_all();
                        return Err(MetricsError::processing(
                            "Scoring failed",
                            format!("scoring worker failed: {}", e),
                        ));
                    }
                    None => break,
                },
                _ = wait_for_stop(stop_rx.clone()) => {
                    workers.abort_all();
                    info!("Calculation cancelled during scoring");
                    return Err(MetricsError::Cancelled);
                }
            }
        }

        Ok(records)
    }
}

/// Embed one batch of `n` responses followed by their `n` ground truths.
/// A timeout or encoder error fails every row of the batch.
async fn embed_batch(
    encoder: Arc<dyn Encoder>,
    texts: Vec<String>,
    n: usize,
    batch_index: usize,
    timeout: Duration,
) -> (usize, Vec<SemanticOutcome>) {
    let outcomes = match tokio::time::timeout(timeout, encoder.embed_batch(&texts)).await {
        Ok(Ok(vectors)) if vectors.len() == texts.len() => (0..n)
            .map(|i| SemanticOutcome::Scored(cosine_similarity(&vectors[i], &vectors[n + i])))
            .collect(),
        Ok(Ok(vectors)) => {
            warn!(
                "Encoder returned {} vectors for {} texts in batch {}",
                vectors.len(),
                texts.len(),
                batch_index
            );
            vec![SemanticOutcome::Failed("encoder returned wrong vector count".to_string()); n]
        }
        Ok(Err(e)) => {
            warn!("Encoder failed for batch {}: {}", batch_index, e);
            vec![SemanticOutcome::Failed(e.to_string()); n]
        }
        Err(_) => {
            warn!("Encoder timed out for batch {} after {:?}", batch_index, timeout);
            vec![SemanticOutcome::Failed(EncoderError::Timeout(timeout).to_string()); n]
        }
    };
    debug!("Embedded batch {} ({} rows)", batch_index, n);
    (batch_index, outcomes)
}

/// Resolves once the stop flag is set. A dropped sender never resolves.
async fn wait_for_stop(mut stop_rx: watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow_and_update() {
            return;
        }
        if stop_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
