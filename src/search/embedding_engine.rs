use anyhow::Result;
use model2vec_rs::model::StaticModel;

const EMBEDDING_MODEL_ID: &str = "minishlab/potion-base-32M";

pub const EMBEDDING_DIMENSION: usize = 512;

/// Text-to-vector interface used by the search engine.
///
/// The production implementation wraps a static embedding model; tests inject
/// deterministic embedders so index and matcher behavior can be verified
/// without downloading model weights.
pub trait TextEmbedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()])?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Failed to generate embedding for text: {}", text))
    }
}

pub struct EmbeddingEngine {
    model: StaticModel,
}

impl EmbeddingEngine {
    pub fn new() -> Result<Self> {
        let model = StaticModel::from_pretrained(EMBEDDING_MODEL_ID, None, None, None)?;
        Ok(Self { model })
    }
}

impl TextEmbedder for EmbeddingEngine {
    fn dimension(&self) -> usize {
        // model2vec_rs does not expose the dimension from the loaded config;
        // pinned to the published size of the model above.
        EMBEDDING_DIMENSION
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.model.encode(texts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Downloads model weights; slow and network-dependent.
    fn embedding_engine_init_and_embed() -> Result<()> {
        let engine = EmbeddingEngine::new()?;
        assert_eq!(engine.dimension(), EMBEDDING_DIMENSION);

        let sentences = vec!["pomodori freschi".to_string(), "riso basmati".to_string()];
        let embeddings = engine.embed_batch(&sentences)?;
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), EMBEDDING_DIMENSION);

        let single = engine.embed_one("gamberi")?;
        assert_eq!(single.len(), EMBEDDING_DIMENSION);
        Ok(())
    }
}
