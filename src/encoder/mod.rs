pub mod hashing;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::DEFAULT_EMBEDDING_DIMENSION;
pub use hashing::HashingEncoder;
pub use http::HttpEncoder;

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("Encoder unavailable: {0}")]
    Unavailable(String),

    #[error("Encoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bad encoder response: {0}")]
    BadResponse(String),

    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Expected dimension {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Text → fixed-length vector. Implementations must be deterministic for
/// identical input.
#[async_trait]
pub trait Encoder: Send + Sync {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => Err(EncoderError::CountMismatch {
                expected: 1,
                actual: vectors.len() + 1,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EncoderSettings {
    #[serde(rename_all = "camelCase")]
    Hashing { dimension: usize },
    #[serde(rename_all = "camelCase")]
    Http {
        endpoint: String,
        model: String,
        /// Environment variable holding a bearer token.
        #[serde(default)]
        api_key_env: Option<String>,
        /// Expected vector length; learned from the first response when unset.
        #[serde(default)]
        dimension: Option<usize>,
    },
}

impl Default for EncoderSettings {
    fn default() -> Self {
        EncoderSettings::Hashing {
            dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

pub fn build_encoder(
    settings: &EncoderSettings,
    request_timeout: Duration,
) -> Result<Arc<dyn Encoder>, EncoderError> {
    match settings {
        EncoderSettings::Hashing { dimension } => Ok(Arc::new(HashingEncoder::new(*dimension))),
        EncoderSettings::Http {
            endpoint,
            model,
            api_key_env,
            dimension,
        } => {
            let api_key = api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|key| !key.is_empty());
            let encoder = HttpEncoder::new(endpoint, model, api_key, *dimension, request_timeout)?;
            Ok(Arc::new(encoder))
        }
    }
}
