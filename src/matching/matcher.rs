use anyhow::Result;
use std::collections::{HashMap, HashSet};

use crate::matching::normalizer::normalize;
use crate::matching::synonyms::SynonymTable;
use crate::search::AnnEngine;

/// Tuning knobs for the layered resolution.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Candidates pulled per semantic search.
    pub top_k: usize,
    /// Minimum cosine similarity for a semantic hit.
    pub score_threshold: f32,
    /// How much the threshold relaxes for the singular-form retry.
    pub plural_relaxation: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            score_threshold: 0.65,
            plural_relaxation: 0.10,
        }
    }
}

/// Which resolution layer produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    Synonym,
    Semantic,
    SingularFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMatch {
    /// Exact database name.
    pub db_name: String,
    pub confidence: f32,
    pub strategy: MatchStrategy,
}

/// Resolves free-form ingredient names to database names through layered
/// lookups: exact, synonym table, semantic search, then a singular-form
/// retry for plural spellings. The cheap layers run first and the embedder
/// is only consulted when they miss.
pub struct IngredientMatcher {
    by_normalized: HashMap<String, String>,
    db_names: HashSet<String>,
    synonyms: SynonymTable,
    engine: AnnEngine,
    config: MatcherConfig,
}

impl IngredientMatcher {
    pub fn new(
        db_names: impl IntoIterator<Item = String>,
        synonyms: SynonymTable,
        engine: AnnEngine,
        config: MatcherConfig,
    ) -> Self {
        let mut by_normalized = HashMap::new();
        let mut names = HashSet::new();
        for name in db_names {
            by_normalized.insert(normalize(&name), name.clone());
            names.insert(name);
        }
        Self {
            by_normalized,
            db_names: names,
            synonyms,
            engine,
            config,
        }
    }

    /// Resolves a raw ingredient name. `Ok(None)` means no layer produced a
    /// confident match; errors are reserved for infrastructure failures such
    /// as a failed embedding.
    pub fn resolve(&self, raw_name: &str) -> Result<Option<ResolvedMatch>> {
        let normalized = normalize(raw_name);
        if normalized.is_empty() {
            return Ok(None);
        }

        if let Some(db_name) = self.by_normalized.get(&normalized) {
            return Ok(Some(ResolvedMatch {
                db_name: db_name.clone(),
                confidence: 1.0,
                strategy: MatchStrategy::Exact,
            }));
        }

        if let Some(mapped) = self.synonyms.canonical_for(&normalized) {
            if self.db_names.contains(mapped) {
                return Ok(Some(ResolvedMatch {
                    db_name: mapped.to_string(),
                    confidence: 0.95,
                    strategy: MatchStrategy::Synonym,
                }));
            }
        }

        if let Some((db_name, score)) =
            self.semantic_lookup(&normalized, self.config.score_threshold)?
        {
            return Ok(Some(ResolvedMatch {
                db_name,
                confidence: score,
                strategy: MatchStrategy::Semantic,
            }));
        }

        if let Some(singular) = self.synonyms.singular_candidate(&normalized) {
            let relaxed = self.config.score_threshold - self.config.plural_relaxation;
            if let Some((db_name, score)) = self.semantic_lookup(&singular, relaxed)? {
                return Ok(Some(ResolvedMatch {
                    db_name,
                    confidence: score,
                    strategy: MatchStrategy::SingularFallback,
                }));
            }
        }

        Ok(None)
    }

    fn semantic_lookup(&self, text: &str, threshold: f32) -> Result<Option<(String, f32)>> {
        let hits = self.engine.search(text, self.config.top_k)?;
        for hit in hits {
            if hit.score >= threshold && self.db_names.contains(&hit.canonical) {
                return Ok(Some((hit.canonical, hit.score)));
            }
        }
        Ok(None)
    }

    pub fn save_index(&self, path: &std::path::Path) -> Result<()> {
        self.engine.save(path)
    }

    pub fn index_entry_count(&self) -> usize {
        self.engine.item_count()
    }
}
