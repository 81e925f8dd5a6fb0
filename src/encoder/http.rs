use async_trait::async_trait;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{Encoder, EncoderError};

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEncoder {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    configured_dimension: Option<usize>,
    learned_dimension: OnceLock<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEncoder {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        dimension: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, EncoderError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| EncoderError::Unavailable(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(EncoderError::Unavailable(format!(
                "unsupported endpoint scheme '{}'",
                endpoint.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
            api_key,
            configured_dimension: dimension,
            learned_dimension: OnceLock::new(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Order by `index`, then check count and vector length.
    fn unpack(&self, body: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>, EncoderError> {
        let mut items = body.data;
        if items.len() != expected {
            return Err(EncoderError::CountMismatch {
                expected,
                actual: items.len(),
            });
        }
        if items.iter().all(|item| item.index.is_some()) {
            items.sort_by_key(|item| item.index);
        }

        let vectors: Vec<Vec<f32>> = items.into_iter().map(|item| item.embedding).collect();
        let Some(first_len) = vectors.first().map(Vec::len) else {
            return Ok(vectors);
        };
        let want = self
            .configured_dimension
            .unwrap_or_else(|| *self.learned_dimension.get_or_init(|| first_len));

        if let Some(bad) = vectors.iter().find(|v| v.len() != want) {
            return Err(EncoderError::DimensionMismatch {
                expected: want,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Encoder for HttpEncoder {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.configured_dimension
            .or_else(|| self.learned_dimension.get().copied())
            .unwrap_or(0)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(self.endpoint.clone()).json(&serde_json::json!({
            "model": self.model,
            "input": texts,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EncoderError::BadResponse(format!(
                "{} returned {}: {}",
                self.endpoint,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| EncoderError::BadResponse(e.to_string()))?;
        debug!("Embedded {} texts via {}", texts.len(), self.endpoint);
        self.unpack(body, texts.len())
    }
}
