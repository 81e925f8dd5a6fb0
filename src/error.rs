use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::error;

use crate::dataset::ValidationError;
use crate::encoder::EncoderError;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Client-correctable input problems, surfaced verbatim.
    #[error("Validation failed with {} issue(s)", .0.len())]
    Validation(Vec<ValidationError>),

    /// Server-side failure during scoring or aggregation. `detail` is for
    /// logs only.
    #[error("{message}")]
    Processing { message: String, detail: String },

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Calculation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MetricsError {
    pub fn processing(message: impl Into<String>, detail: impl Into<String>) -> Self {
        MetricsError::Processing {
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            MetricsError::Validation(_) => "VALIDATION_ERROR",
            MetricsError::Processing { .. } | MetricsError::Encoder(_) => "PROCESSING_ERROR",
            MetricsError::Cancelled => "CANCELLED",
            MetricsError::Io(_) | MetricsError::Json(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        let status = match &self {
            MetricsError::Validation(_) => StatusCode::BAD_REQUEST,
            MetricsError::Processing { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            MetricsError::Encoder(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MetricsError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            MetricsError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MetricsError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let details = match &self {
            MetricsError::Validation(errors) => serde_json::json!({ "errors": errors }),
            MetricsError::Processing { detail, .. } => {
                error!("Processing error: {} ({})", self, detail);
                serde_json::json!({})
            }
            other => {
                error!("Request failed: {}", other);
                serde_json::json!({})
            }
        };

        let message = match &self {
            MetricsError::Io(_) | MetricsError::Json(_) => {
                "An unexpected error occurred".to_string()
            }
            MetricsError::Encoder(_) => "Embedding encoder failed".to_string(),
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": self.code(),
            "message": message,
            "details": details,
            "timestamp": Utc::now().to_rfc3339(),
        });

        (status, axum::Json(body)).into_response()
    }
}
