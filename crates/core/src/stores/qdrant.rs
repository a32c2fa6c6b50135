use crate::filter::RangeFilter;
use crate::traits::VectorIndex;
use crate::{Hit, RetrievalError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

/// Payload field names the collection was indexed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadKeys {
    pub document_id: String,
    pub text: String,
    pub created_at: String,
}

impl Default for PayloadKeys {
    fn default() -> Self {
        Self {
            document_id: "id".to_string(),
            text: "textToIndex".to_string(),
            created_at: "created_at".to_string(),
        }
    }
}

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
    keys: PayloadKeys,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
        keys: PayloadKeys,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
            keys,
        }
    }

    fn search_url(&self) -> String {
        format!(
            "{}/collections/{}/points/search",
            self.endpoint, self.collection
        )
    }
}

pub fn search_body(vector: &[f32], limit: usize, filter: Option<&RangeFilter>) -> Value {
    let mut body = json!({
        "vector": vector,
        "limit": limit,
        "with_payload": true,
    });
    if let Some(filter) = filter {
        body["filter"] = filter.to_qdrant();
    }
    body
}

/// Converts a `points/search` response into hits, in response order.
pub fn parse_hits(parsed: &Value, keys: &PayloadKeys) -> Vec<Hit> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.iter()
        .map(|hit| {
            let payload = hit.get("payload");
            let document_id = payload
                .and_then(|payload| payload.get(&keys.document_id))
                .map(payload_id)
                .unwrap_or_default();
            let text = payload
                .and_then(|payload| payload.get(&keys.text))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;

            Hit {
                score,
                document_id,
                text,
            }
        })
        .collect()
}

fn check_status(status: StatusCode) -> Result<(), RetrievalError> {
    if status.is_success() {
        return Ok(());
    }
    Err(RetrievalError::VectorQuery(format!("qdrant returned {status}")))
}

fn payload_id(value: &Value) -> String {
    match value {
        Value::String(id) => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => String::new(),
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    fn dimensions(&self) -> usize {
        self.vector_size
    }

    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&RangeFilter>,
    ) -> Result<Vec<Hit>, RetrievalError> {
        if vector.len() != self.vector_size {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.vector_size,
                actual: vector.len(),
            });
        }

        let response = self
            .client
            .post(self.search_url())
            .json(&search_body(vector, limit, filter))
            .send()
            .await
            .map_err(|error| RetrievalError::VectorQuery(error.to_string()))?;

        check_status(response.status())?;

        let parsed: Value = response
            .json()
            .await
            .map_err(|error| RetrievalError::VectorQuery(error.to_string()))?;
        let hits = parse_hits(&parsed, &self.keys);
        debug!(collection = %self.collection, hits = hits.len(), "qdrant search complete");
        Ok(hits)
    }
}
