pub mod aggregator;
pub mod cancel;
pub mod embeddings;
pub mod error;
pub mod filter;
pub mod html;
pub mod mcp;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod stores;
pub mod tools;
pub mod traits;

pub use aggregator::{aggregate, EvidenceSet};
pub use embeddings::{OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL};
pub use error::{RetrievalError, TimeParseError, ValidationError};
pub use filter::{local_offset, parse_local_timestamp, RangeFilter, DEFAULT_UTC_OFFSET_SECONDS};
pub use models::{
    ArticleQuery, BenefitRecord, ContextBundle, DocumentEvidence, Hit, Supplement, TimeRange,
    UserRecord, DEFAULT_LIMIT, DEFAULT_SCORE_FLOOR, MAX_LIMIT, NO_RELEVANT_RESULTS_MESSAGE,
    NO_RESULTS_MESSAGE,
};
pub use orchestrator::ArticleRetriever;
pub use policy::{
    build_policy, PolicyKind, PolicyThresholds, RetrievalPolicy, ScoreFloorPolicy,
    ThresholdPolicy,
};
pub use stores::{PayloadKeys, QdrantStore, SqliteStore};
pub use mcp::{render_call_result, FinanceNewsServer, RenderedResult, SERVER_NAME};
pub use tools::{LooseNumber, ToolBox, ToolOutput, ToolService};
pub use traits::{DocumentFetcher, Embedder, UserDirectory, VectorIndex};
