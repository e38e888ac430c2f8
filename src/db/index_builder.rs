use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::matching::{normalize, IngredientMatcher, MatcherConfig, ResolvedMatch, SynonymTable};
use crate::models::IngredientInfo;
use crate::search::{AnnEngine, TextEmbedder};

/// The ingredient database plus the matcher built over it.
///
/// Construction embeds every database name together with its registered
/// synonyms and derived plural spellings, so the semantic layer can land on
/// a canonical entry from any of them.
pub struct NutritionBase {
    ingredients: HashMap<String, IngredientInfo>,
    matcher: IngredientMatcher,
}

impl NutritionBase {
    pub fn build(
        items: Vec<IngredientInfo>,
        synonyms: SynonymTable,
        embedder: Arc<dyn TextEmbedder>,
        config: MatcherConfig,
        progress_updater: &impl Fn(String),
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(anyhow::anyhow!("No ingredients provided for the index"));
        }

        let ingredients = dedup_by_name(items);
        let entries = build_index_entries(&ingredients, &synonyms);
        let texts: Vec<String> = entries.keys().cloned().collect();
        let pairs: Vec<(String, String)> = entries.into_iter().collect();

        progress_updater(format!(
            " > Generating embeddings for {} index entries covering {} ingredients...",
            texts.len(),
            ingredients.len()
        ));
        let embeddings = embedder
            .embed_batch(&texts)
            .with_context(|| "Failed to generate embeddings for index entries")?;
        if embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            );
        }
        inspect_embeddings(&embeddings, &texts, embedder.dimension())?;

        let mut engine = AnnEngine::new(embedder);
        engine
            .add_entries_batch(&pairs, embeddings)
            .with_context(|| "Failed to add index entries to the search engine")?;
        progress_updater(format!(
            " > Indexed {} entries. Item count: {}",
            pairs.len(),
            engine.item_count()
        ));

        let matcher =
            IngredientMatcher::new(ingredients.keys().cloned(), synonyms, engine, config);
        Ok(Self {
            ingredients,
            matcher,
        })
    }

    /// Restores the search index from a snapshot instead of re-embedding.
    pub fn load(
        items: Vec<IngredientInfo>,
        synonyms: SynonymTable,
        embedder: Arc<dyn TextEmbedder>,
        config: MatcherConfig,
        snapshot_path: &Path,
        progress_updater: &impl Fn(String),
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(anyhow::anyhow!("No ingredients provided for the index"));
        }
        let ingredients = dedup_by_name(items);

        let engine = AnnEngine::load(snapshot_path, embedder).with_context(|| {
            format!(
                "Failed to restore search index from {:?}",
                snapshot_path
            )
        })?;
        progress_updater(format!(
            " > Restored {} index entries from {:?}",
            engine.item_count(),
            snapshot_path
        ));

        let matcher =
            IngredientMatcher::new(ingredients.keys().cloned(), synonyms, engine, config);
        Ok(Self {
            ingredients,
            matcher,
        })
    }

    pub fn save_index(&self, path: &Path) -> Result<()> {
        self.matcher.save_index(path)
    }

    pub fn get(&self, db_name: &str) -> Option<&IngredientInfo> {
        self.ingredients.get(db_name)
    }

    pub fn resolve(&self, raw_name: &str) -> Result<Option<ResolvedMatch>> {
        self.matcher.resolve(raw_name)
    }

    pub fn ingredient_count(&self) -> usize {
        self.ingredients.len()
    }

    pub fn index_entry_count(&self) -> usize {
        self.matcher.index_entry_count()
    }
}

fn dedup_by_name(items: Vec<IngredientInfo>) -> HashMap<String, IngredientInfo> {
    let mut ingredients: HashMap<String, IngredientInfo> = HashMap::new();
    for item in items {
        if ingredients.contains_key(&item.name) {
            eprintln!(
                "[WARNING] Duplicate ingredient name '{}' in database; keeping the last row.",
                item.name
            );
        }
        ingredients.insert(item.name.clone(), item);
    }
    ingredients
}

/// Every index entry maps one embedded text to the exact database name it
/// resolves to. Texts are deduplicated (first claim wins, in sorted name
/// order) and returned sorted.
fn build_index_entries(
    ingredients: &HashMap<String, IngredientInfo>,
    synonyms: &SynonymTable,
) -> BTreeMap<String, String> {
    let mut names: Vec<&String> = ingredients.keys().collect();
    names.sort();

    let mut entries: BTreeMap<String, String> = BTreeMap::new();
    for canonical in names {
        let normalized = normalize(canonical);
        if normalized.is_empty() {
            continue;
        }
        let mut texts = vec![normalized.clone()];
        texts.extend(synonyms.variants_for_index(&normalized).iter().cloned());
        texts.extend(synonyms.plural_variants(&normalized));

        for text in texts {
            entries.entry(text).or_insert_with(|| canonical.clone());
        }
    }
    entries
}

fn inspect_embeddings(embeddings: &[Vec<f32>], texts: &[String], dimension: usize) -> Result<()> {
    let mut found_nan_inf = false;
    let mut found_wrong_dimension = false;
    let mut zero_count = 0usize;

    for (idx, emb) in embeddings.iter().enumerate() {
        if emb.len() != dimension {
            eprintln!(
                "[ERROR] Embedding for '{}' has incorrect dimension: {}. Expected: {}",
                texts[idx],
                emb.len(),
                dimension
            );
            found_wrong_dimension = true;
        }
        if emb.iter().any(|val| val.is_nan() || val.is_infinite()) {
            eprintln!("[ERROR] Embedding for '{}' contains NaN or Infinity.", texts[idx]);
            found_nan_inf = true;
        }
        if emb.iter().all(|&val| val == 0.0) {
            zero_count += 1;
        }
    }

    if found_wrong_dimension {
        anyhow::bail!("One or more embeddings had an incorrect dimension. Cannot proceed.");
    }
    if found_nan_inf {
        anyhow::bail!("One or more embeddings contained NaN or Infinity. Cannot proceed.");
    }
    if zero_count > 0 {
        eprintln!(
            "[WARNING] Found {} all-zero embeddings out of {}. Those entries will never match.",
            zero_count,
            embeddings.len()
        );
    }

    let mut unique = HashSet::new();
    let mut duplicate_count = 0usize;
    for emb in embeddings {
        let bits: Vec<u32> = emb.iter().map(|f| f.to_bits()).collect();
        if !unique.insert(bits) {
            duplicate_count += 1;
        }
    }
    if duplicate_count > 0 {
        eprintln!(
            "[WARNING] Found {} duplicate embeddings out of {}. Distinct entries may tie in search.",
            duplicate_count,
            embeddings.len()
        );
    }

    Ok(())
}
