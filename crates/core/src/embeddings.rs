use crate::traits::Embedder;
use crate::RetrievalError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

pub const DEFAULT_EMBEDDING_MODEL: &str = "qwen/qwen3-embedding-8b";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    endpoint: Url,
    api_key: String,
    model: String,
    dimensions: usize,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, RetrievalError> {
        let base = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };

        Ok(Self {
            endpoint: base.join("embeddings")?,
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            client: Client::new(),
        })
    }

    fn request_body(&self, text: &str) -> Value {
        json!({
            "model": self.model,
            "input": text,
            "encoding_format": "float",
            "dimensions": self.dimensions,
        })
    }
}

/// Pulls the first embedding out of an `/embeddings` response and checks its
/// length against the configured dimensionality.
pub fn parse_embedding(body: &Value, expected: usize) -> Result<Vec<f32>, RetrievalError> {
    let values = body
        .pointer("/data/0/embedding")
        .and_then(Value::as_array)
        .ok_or_else(|| RetrievalError::Embedding("no embedding data".to_string()))?;

    let vector = values
        .iter()
        .map(|value| {
            value
                .as_f64()
                .map(|number| number as f32)
                .ok_or_else(|| RetrievalError::Embedding(format!("non-numeric component {value}")))
        })
        .collect::<Result<Vec<f32>, RetrievalError>>()?;

    if vector.is_empty() {
        return Err(RetrievalError::Embedding("empty embedding vector".to_string()));
    }
    if vector.len() != expected {
        return Err(RetrievalError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }

    Ok(vector)
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|error| RetrievalError::Embedding(error.to_string()))?;

        if !response.status().is_success() {
            return Err(RetrievalError::Embedding(format!(
                "embedding service returned {}",
                response.status()
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|error| RetrievalError::Embedding(error.to_string()))?;
        let vector = parse_embedding(&parsed, self.dimensions)?;
        debug!(model = %self.model, dimensions = vector.len(), "embedded query");
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_joined_under_base_path() {
        let embedder =
            OpenAiEmbedder::new("https://openrouter.ai/api/v1", "key", DEFAULT_EMBEDDING_MODEL, 4)
                .expect("valid url");
        assert_eq!(
            embedder.endpoint.as_str(),
            "https://openrouter.ai/api/v1/embeddings"
        );
    }

    #[test]
    fn request_asks_for_float_vectors_of_configured_size() {
        let embedder = OpenAiEmbedder::new("http://localhost:8080/v1/", "key", "m", 1536)
            .expect("valid url");
        let body = embedder.request_body("rate cut odds");
        assert_eq!(body["dimensions"], json!(1536));
        assert_eq!(body["encoding_format"], json!("float"));
        assert_eq!(body["input"], json!("rate cut odds"));
    }

    #[test]
    fn parses_first_embedding() {
        let body = json!({ "data": [ { "embedding": [0.5, -0.25, 1.0] } ] });
        let vector = parse_embedding(&body, 3).expect("parse");
        assert_eq!(vector, vec![0.5, -0.25, 1.0]);
    }

    #[test]
    fn missing_data_is_an_embedding_failure() {
        let body = json!({ "data": [] });
        assert!(matches!(
            parse_embedding(&body, 3),
            Err(RetrievalError::Embedding(_))
        ));
    }

    #[test]
    fn empty_vector_is_an_embedding_failure() {
        let body = json!({ "data": [ { "embedding": [] } ] });
        assert!(matches!(
            parse_embedding(&body, 3),
            Err(RetrievalError::Embedding(_))
        ));
    }

    #[test]
    fn wrong_length_is_a_dimension_mismatch() {
        let body = json!({ "data": [ { "embedding": [0.1, 0.2] } ] });
        assert!(matches!(
            parse_embedding(&body, 4),
            Err(RetrievalError::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        ));
    }
}
