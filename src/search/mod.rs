pub mod ann_engine;
pub mod embedding_engine;
pub mod vector_store;

pub use ann_engine::AnnEngine;
pub use embedding_engine::{EmbeddingEngine, TextEmbedder, EMBEDDING_DIMENSION};
pub use vector_store::{IndexedName, ScoredName, VectorStore};
