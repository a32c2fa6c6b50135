use thiserror::Error;

#[derive(Debug, Error)]
#[error("{field} '{value}' is not a valid local timestamp: {details}")]
pub struct TimeParseError {
    pub field: &'static str,
    pub value: String,
    pub details: String,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing required parameter: {0}")]
    MissingField(&'static str),

    #[error("invalid parameter {field}: {details}")]
    InvalidField { field: &'static str, details: String },
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector search failed: {0}")]
    VectorQuery(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    TimeParse(#[from] TimeParseError),

    #[error("document fetch failed: {0}")]
    DocumentFetch(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("relational store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("request cancelled")]
    Cancelled,
}

pub type Result<T, E = RetrievalError> = std::result::Result<T, E>;
