use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::state::SharedState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub encoder: EncoderHealth,
    pub started_at: String,
    pub calculations: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EncoderHealth {
    pub name: String,
    pub dimension: usize,
}

/// GET /health: liveness plus which encoder is configured.
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let encoder = state.engine.encoder();
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        encoder: EncoderHealth {
            name: encoder.name().to_string(),
            dimension: encoder.dimension(),
        },
        started_at: state.started_at.to_rfc3339(),
        calculations: state.calculations(),
    })
}
