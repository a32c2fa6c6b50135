use crate::filter::RangeFilter;
use crate::{BenefitRecord, Hit, RetrievalError, TimeRange, UserRecord};
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimensionality the collection was created with.
    fn dimensions(&self) -> usize;

    /// Nearest-neighbour query with payload. An empty result is not an error.
    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&RangeFilter>,
    ) -> Result<Vec<Hit>, RetrievalError>;
}

/// `Ok(None)` means not found, which the policy treats the same as empty text.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch_full_text(&self, document_id: &str) -> Result<Option<String>, RetrievalError>;

    async fn fetch_summary(&self, document_id: &str) -> Result<Option<String>, RetrievalError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn users_created_between(
        &self,
        range: &TimeRange,
        limit: usize,
    ) -> Result<Vec<UserRecord>, RetrievalError>;

    async fn benefit_records(
        &self,
        user_ids: &[i64],
        subject_ids: &[i64],
    ) -> Result<Vec<BenefitRecord>, RetrievalError>;
}
