use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::search::embedding_engine::TextEmbedder;
use crate::search::vector_store::{IndexedName, ScoredName, VectorStore};

/// Semantic search over indexed ingredient names: a vector store plus the
/// embedder that maps query text into it.
pub struct AnnEngine {
    store: VectorStore,
    embedder: Arc<dyn TextEmbedder>,
    dimension: usize,
}

impl AnnEngine {
    pub fn new(embedder: Arc<dyn TextEmbedder>) -> Self {
        let dimension = embedder.dimension();
        Self {
            store: VectorStore::new(dimension),
            embedder,
            dimension,
        }
    }

    /// Restores an engine from a saved store snapshot.
    pub fn load(path: &Path, embedder: Arc<dyn TextEmbedder>) -> Result<Self> {
        let dimension = embedder.dimension();
        let store = VectorStore::load(path, dimension)
            .with_context(|| format!("Failed to load vector store from {}", path.display()))?;
        Ok(Self {
            store,
            embedder,
            dimension,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.store
            .save(path)
            .with_context(|| format!("Failed to save vector store to {}", path.display()))
    }

    /// Adds pre-embedded entries. `entries` pairs each indexed text with the
    /// exact database name it resolves to.
    pub fn add_entries_batch(
        &mut self,
        entries: &[(String, String)],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<()> {
        if embeddings.len() != entries.len() {
            return Err(anyhow::anyhow!(
                "Embeddings and entries count mismatch: {} vs {}",
                embeddings.len(),
                entries.len()
            ));
        }

        let mut items = Vec::with_capacity(entries.len());
        for ((entry, canonical), embedding) in entries.iter().zip(embeddings) {
            if embedding.len() != self.dimension {
                return Err(anyhow::anyhow!(
                    "Embedding dimension mismatch for entry '{}'. Expected {}, got {}.",
                    entry,
                    self.dimension,
                    embedding.len()
                ));
            }
            items.push(IndexedName {
                entry: entry.clone(),
                canonical: canonical.clone(),
                vector: embedding,
            });
        }

        if !items.is_empty() {
            self.store
                .upsert(items)
                .with_context(|| "Failed to upsert batch into vector store")?;
        }
        Ok(())
    }

    /// Embeds `text` and returns the `k` nearest entries, best first.
    pub fn search(&self, text: &str, k: usize) -> Result<Vec<ScoredName>> {
        let query = self
            .embedder
            .embed_one(text)
            .with_context(|| format!("Failed to embed query '{}'", text))?;
        if query.len() != self.dimension {
            anyhow::bail!(
                "Query embedding dimension mismatch. Expected {}, got {}.",
                self.dimension,
                query.len()
            );
        }
        Ok(self.store.query(&query, k, None))
    }

    pub fn item_count(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    /// Deterministic embedder: every distinct text gets its own unit axis, so
    /// identical texts score 1.0 and distinct texts score 0.0.
    struct AxisEmbedder {
        axes: Mutex<HashMap<String, usize>>,
        dim: usize,
    }

    impl AxisEmbedder {
        fn new(dim: usize) -> Self {
            Self {
                axes: Mutex::new(HashMap::new()),
                dim,
            }
        }
    }

    impl TextEmbedder for AxisEmbedder {
        fn dimension(&self) -> usize {
            self.dim
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut axes = self.axes.lock().unwrap();
            Ok(texts
                .iter()
                .map(|t| {
                    let next = axes.len();
                    let idx = *axes.entry(t.clone()).or_insert(next);
                    let mut v = vec![0.0; self.dim];
                    v[idx % self.dim] = 1.0;
                    v
                })
                .collect())
        }
    }

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(e, c)| (e.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn add_and_search_returns_best_match_first() -> Result<()> {
        let embedder = Arc::new(AxisEmbedder::new(16));
        let mut engine = AnnEngine::new(embedder.clone());

        let entries = pairs(&[
            ("pomodori", "Pomodoro"),
            ("riso", "Riso"),
            ("gambero", "Gamberi"),
        ]);
        let texts: Vec<String> = entries.iter().map(|(e, _)| e.clone()).collect();
        let embeddings = embedder.embed_batch(&texts)?;
        engine.add_entries_batch(&entries, embeddings)?;
        assert_eq!(engine.item_count(), 3);

        let results = engine.search("gambero", 2)?;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry, "gambero");
        assert_eq!(results[0].canonical, "Gamberi");
        assert!(results[0].score > 0.99);
        assert!(results[1].score < 0.01);

        Ok(())
    }

    #[test]
    fn unseen_query_scores_near_zero() -> Result<()> {
        let embedder = Arc::new(AxisEmbedder::new(16));
        let mut engine = AnnEngine::new(embedder.clone());

        let entries = pairs(&[("pomodori", "Pomodoro")]);
        let embeddings = embedder.embed_batch(&["pomodori".to_string()])?;
        engine.add_entries_batch(&entries, embeddings)?;

        let results = engine.search("quinoa", 1)?;
        assert_eq!(results.len(), 1);
        assert!(results[0].score < 0.01);
        Ok(())
    }

    #[test]
    fn batch_count_mismatch_is_rejected() {
        let embedder = Arc::new(AxisEmbedder::new(8));
        let mut engine = AnnEngine::new(embedder);

        let entries = pairs(&[("a", "A"), ("b", "B")]);
        let result = engine.add_entries_batch(&entries, vec![vec![0.0; 8]]);
        assert!(result.is_err());
    }

    #[test]
    fn save_and_load_preserves_entries() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let embedder = Arc::new(AxisEmbedder::new(16));

        let mut engine = AnnEngine::new(embedder.clone());
        let entries = pairs(&[("riso", "Riso"), ("farro", "Farro")]);
        let texts: Vec<String> = entries.iter().map(|(e, _)| e.clone()).collect();
        let embeddings = embedder.embed_batch(&texts)?;
        engine.add_entries_batch(&entries, embeddings)?;
        engine.save(temp_file.path())?;

        let restored = AnnEngine::load(temp_file.path(), embedder)?;
        assert_eq!(restored.item_count(), 2);
        let results = restored.search("farro", 1)?;
        assert_eq!(results[0].canonical, "Farro");
        assert!(results[0].score > 0.99);
        Ok(())
    }
}
