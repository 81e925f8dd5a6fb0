use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::dataset::ValidationError;
use crate::error::MetricsError;
use crate::metrics::engine::ValidationReport;
use crate::metrics::{CalculationRequest, MetricResult};
use crate::state::SharedState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationErrorResponse {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

/// POST /api/v1/validate: check structure and mapping without scoring.
pub async fn validate(
    State(state): State<SharedState>,
    Json(body): Json<CalculationRequest>,
) -> Response {
    match state.engine.validate(&body) {
        Ok(report) => Json::<ValidationReport>(report).into_response(),
        Err(MetricsError::Validation(errors)) => (
            StatusCode::BAD_REQUEST,
            Json(ValidationErrorResponse {
                valid: false,
                errors,
            }),
        )
            .into_response(),
        Err(other) => other.into_response(),
    }
}

/// POST /api/v1/metrics/calculate: full calculation.
///
/// The stop sender lives as long as the handler; a client disconnect drops
/// the handler future and with it every outstanding scoring task.
pub async fn calculate(
    State(state): State<SharedState>,
    Json(body): Json<CalculationRequest>,
) -> Result<Json<MetricResult>, MetricsError> {
    let (_stop_tx, stop_rx) = watch::channel(false);
    let result = state.engine.calculate(&body, stop_rx).await?;
    let n = state.record_calculation();
    info!(
        "Calculation #{} done: {} rows, {:.3}s",
        n,
        result.per_query_metrics.len(),
        result.calculation_time
    );
    Ok(Json(result))
}
