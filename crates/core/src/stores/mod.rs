pub mod qdrant;
pub mod sqlite;

pub use qdrant::{PayloadKeys, QdrantStore};
pub use sqlite::SqliteStore;
