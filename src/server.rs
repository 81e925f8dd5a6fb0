use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyHeader, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{API_PREFIX, CORS_ORIGINS, MAX_BODY_BYTES};
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let origins: Vec<HeaderValue> = CORS_ORIGINS
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AnyHeader);

    let api = Router::new()
        .route("/validate", post(crate::routes::metrics::validate))
        .route("/metrics/calculate", post(crate::routes::metrics::calculate))
        // Oversized datasets must reach the validator and get a typed error.
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    Router::new()
        // Health
        .route("/health", get(crate::routes::health::health))
        // Metrics API
        .nest(API_PREFIX, api)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!("Unhandled panic in request handler: {}", detail);

    let body = serde_json::json!({
        "error": "INTERNAL_SERVER_ERROR",
        "message": "An unexpected error occurred",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    (
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(body),
    )
        .into_response()
}
