use crate::cancel::until_cancelled;
use crate::filter::RangeFilter;
use crate::policy::RetrievalPolicy;
use crate::stores::PayloadKeys;
use crate::traits::{DocumentFetcher, Embedder, VectorIndex};
use crate::{ArticleQuery, ContextBundle, RetrievalError, ValidationError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Runs one article query end to end: embed, vector search, policy.
pub struct ArticleRetriever<E, V, D>
where
    E: Embedder,
    V: VectorIndex,
    D: DocumentFetcher,
{
    embedder: E,
    index: V,
    fetcher: D,
    policy: Box<dyn RetrievalPolicy>,
    keys: PayloadKeys,
}

impl<E, V, D> ArticleRetriever<E, V, D>
where
    E: Embedder,
    V: VectorIndex,
    D: DocumentFetcher,
{
    pub fn new(
        embedder: E,
        index: V,
        fetcher: D,
        policy: Box<dyn RetrievalPolicy>,
        keys: PayloadKeys,
    ) -> Self {
        Self {
            embedder,
            index,
            fetcher,
            policy,
            keys,
        }
    }

    pub async fn retrieve(
        &self,
        query: &ArticleQuery,
        cancel: &CancellationToken,
    ) -> Result<ContextBundle, RetrievalError> {
        let span = info_span!(
            "retrieve",
            request_id = %Uuid::new_v4(),
            policy = %self.policy.kind(),
            limit = query.limit
        );
        self.retrieve_inner(query, cancel).instrument(span).await
    }

    async fn retrieve_inner(
        &self,
        query: &ArticleQuery,
        cancel: &CancellationToken,
    ) -> Result<ContextBundle, RetrievalError> {
        if query.text.trim().is_empty() {
            return Err(ValidationError::MissingField("query").into());
        }

        let vector = until_cancelled(cancel, self.embedder.embed(&query.text)).await?;
        if vector.is_empty() {
            return Err(RetrievalError::Embedding("empty embedding vector".to_string()));
        }
        if vector.len() != self.index.dimensions() {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.index.dimensions(),
                actual: vector.len(),
            });
        }

        let filter = query
            .time_range
            .as_ref()
            .map(|range| RangeFilter::created_between(self.keys.created_at.clone(), range));
        if let Some(filter) = &filter {
            debug!(gte = filter.gte, lte = filter.lte, "applying creation-time filter");
        }

        let hits = until_cancelled(
            cancel,
            self.index.query(&vector, query.limit, filter.as_ref()),
        )
        .await?;
        info!(hits = hits.len(), "vector search returned hits");

        let bundle = self
            .policy
            .assemble(&hits, query, &self.fetcher, cancel)
            .await?;
        debug!(empty = bundle.is_empty_result(), "context assembled");
        Ok(bundle)
    }
}
