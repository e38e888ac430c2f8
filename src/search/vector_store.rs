//! In-memory vector store for ingredient name search.
#![forbid(unsafe_code)]

use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fs;
use std::path::Path;

type Float = f32;

/// A single indexed name. `entry` is the text that was embedded (a canonical
/// name, a synonym or a derived plural); `canonical` is the exact database
/// name the entry resolves to.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IndexedName {
    pub entry: String,
    pub canonical: String,
    /// The vector data, kept out of the snapshot (the matrix carries it).
    #[serde(skip)]
    pub vector: Vec<Float>,
}

/// A search hit with its cosine similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredName {
    pub entry: String,
    pub canonical: String,
    pub score: Float,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    embedding_dim: usize,
    names: Vec<IndexedName>,
    #[serde(with = "base64_bytes")]
    matrix: Vec<Float>,
}

mod base64_bytes {
    use super::*;
    use bytemuck::cast_slice;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(vec: &[Float], serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = cast_slice(vec);
        let b64 = general_purpose::STANDARD.encode(bytes);
        serializer.serialize_str(&b64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Float>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)?;
        if bytes.len() % std::mem::size_of::<Float>() != 0 {
            return Err(serde::de::Error::custom(format!(
                "Matrix byte length {} is not a multiple of {}",
                bytes.len(),
                std::mem::size_of::<Float>()
            )));
        }
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}

/// Flat-matrix vector store with exhaustive cosine search.
///
/// Vectors are normalized on insert, so similarity is a plain dot product.
/// The store lives in memory; `save`/`load` snapshot it to a JSON file with
/// the matrix base64-encoded.
#[derive(Debug)]
pub struct VectorStore {
    embedding_dim: usize,
    names: Vec<IndexedName>,
    matrix: Vec<Float>,
}

#[derive(PartialEq)]
struct ScoredIndex {
    score: Float,
    index: usize,
}

impl Eq for ScoredIndex {}

impl PartialOrd for ScoredIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the default max-heap behaves as a min-heap on score:
        // pushing past capacity pops the worst hit, keeping the K best.
        other.score.partial_cmp(&self.score).unwrap_or_else(|| {
            // NaN scores still need a total order.
            if self.score.is_nan() && !other.score.is_nan() {
                Ordering::Less
            } else if !self.score.is_nan() && other.score.is_nan() {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
    }
}

impl VectorStore {
    /// Creates an empty in-memory store.
    pub fn new(embedding_dim: usize) -> Self {
        Self {
            embedding_dim,
            names: Vec::new(),
            matrix: Vec::new(),
        }
    }

    /// Loads a snapshot from disk, validating it against the expected
    /// dimension.
    pub fn load(path: &Path, embedding_dim: usize) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;

        if snapshot.embedding_dim != embedding_dim {
            anyhow::bail!(
                "Embedding dimension mismatch: snapshot has {}, expected {}",
                snapshot.embedding_dim,
                embedding_dim
            );
        }
        let expected_len = snapshot.names.len() * snapshot.embedding_dim;
        if snapshot.matrix.len() != expected_len {
            anyhow::bail!(
                "Matrix size mismatch: expected {}, got {}",
                expected_len,
                snapshot.matrix.len()
            );
        }

        Ok(Self {
            embedding_dim,
            names: snapshot.names,
            matrix: snapshot.matrix,
        })
    }

    /// Writes the store to a JSON snapshot.
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            embedding_dim: self.embedding_dim,
            names: self.names.clone(),
            matrix: self.matrix.clone(),
        };
        let serialized = serde_json::to_string(&snapshot)?;
        fs::write(path, serialized)?;
        Ok(())
    }

    /// Inserts or updates entries by `entry` text. Returns the updated and
    /// inserted entry names.
    pub fn upsert(&mut self, mut items: Vec<IndexedName>) -> Result<(Vec<String>, Vec<String>)> {
        let mut updates = Vec::new();
        let mut inserts = Vec::new();

        let existing: HashMap<String, usize> = self
            .names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.entry.clone(), i))
            .collect();

        for item in items.drain(..) {
            if item.vector.len() != self.embedding_dim {
                anyhow::bail!(
                    "Vector dimension mismatch for entry '{}': expected {}, got {}",
                    item.entry,
                    self.embedding_dim,
                    item.vector.len()
                );
            }
            let norm_vec = normalize(&item.vector);
            if let Some(&pos) = existing.get(&item.entry) {
                let start = pos * self.embedding_dim;
                self.matrix[start..start + self.embedding_dim].copy_from_slice(&norm_vec);
                self.names[pos].canonical = item.canonical;
                self.names[pos].vector = norm_vec;
                updates.push(item.entry);
            } else {
                self.matrix.extend_from_slice(&norm_vec);
                self.names.push(IndexedName {
                    entry: item.entry.clone(),
                    canonical: item.canonical,
                    vector: norm_vec,
                });
                inserts.push(item.entry);
            }
        }

        Ok((updates, inserts))
    }

    /// Returns the `top_k` most similar entries, best first. `better_than`
    /// drops hits below a similarity floor.
    pub fn query(&self, query: &[Float], top_k: usize, better_than: Option<Float>) -> Vec<ScoredName> {
        if self.names.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let query_norm = normalize(query);
        let threshold = better_than.unwrap_or(-1.0);

        let scores: Vec<Float> = self
            .matrix
            .par_chunks(self.embedding_dim)
            .map(|row| dot_product(row, &query_norm))
            .collect();

        let mut heap = BinaryHeap::with_capacity(top_k + 1);
        for (index, &score) in scores.iter().enumerate() {
            if score >= threshold {
                heap.push(ScoredIndex { score, index });
                if heap.len() > top_k {
                    heap.pop();
                }
            }
        }

        // Reversed Ord makes into_sorted_vec yield highest scores first.
        heap.into_sorted_vec()
            .into_iter()
            .map(|si| {
                let name = &self.names[si.index];
                ScoredName {
                    entry: name.entry.clone(),
                    canonical: name.canonical.clone(),
                    score: si.score,
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[inline]
fn dot_product(vec1: &[Float], vec2: &[Float]) -> Float {
    vec1.iter().zip(vec2.iter()).map(|(a, b)| a * b).sum()
}

/// Normalize a vector to unit length. Zero vectors stay zero.
pub fn normalize(vector: &[Float]) -> Vec<Float> {
    let norm_sq: Float = vector.iter().map(|&x| x * x).sum();
    if norm_sq == 0.0 {
        return vec![0.0; vector.len()];
    }
    let inv_norm = 1.0 / norm_sq.sqrt();
    vector.iter().map(|&x| x * inv_norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn entry(name: &str, canonical: &str, vector: Vec<Float>) -> IndexedName {
        IndexedName {
            entry: name.to_string(),
            canonical: canonical.to_string(),
            vector,
        }
    }

    #[test]
    fn base64_matrix_round_trip() {
        let snapshot = Snapshot {
            embedding_dim: 2,
            names: vec![entry("test", "Test", vec![1.0, 2.0])],
            matrix: vec![1.0, 2.0],
        };
        let serialized = serde_json::to_string(&snapshot).unwrap();
        let deserialized: Snapshot = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.matrix, vec![1.0, 2.0]);

        let invalid_json = r#"{
            "embedding_dim": 2,
            "names": [{"entry": "test", "canonical": "Test"}],
            "matrix": "INVALID_BASE64!!"
        }"#;
        let result: Result<Snapshot, _> = serde_json::from_str(invalid_json);
        assert!(result.is_err());
    }

    #[test]
    fn load_rejects_matrix_size_mismatch() {
        let temp_file = NamedTempFile::new().unwrap();
        let corrupt = Snapshot {
            embedding_dim: 2,
            names: vec![entry("entry1", "Entry1", vec![1.0, 2.0])],
            matrix: vec![1.0], // one element, but one 2-dim entry needs two
        };
        fs::write(temp_file.path(), serde_json::to_string(&corrupt).unwrap()).unwrap();

        let result = VectorStore::load(temp_file.path(), 2);
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("Matrix size mismatch"), "{}", err_msg);
    }

    #[test]
    fn load_rejects_dimension_mismatch() {
        let temp_file = NamedTempFile::new().unwrap();
        let snapshot = Snapshot {
            embedding_dim: 2,
            names: vec![entry("entry1", "Entry1", vec![1.0, 2.0])],
            matrix: vec![0.0, 0.0],
        };
        fs::write(temp_file.path(), serde_json::to_string(&snapshot).unwrap()).unwrap();

        let result = VectorStore::load(temp_file.path(), 3);
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("Embedding dimension mismatch"), "{}", err_msg);
    }

    #[test]
    fn scored_index_keeps_top_k() {
        let mut heap = BinaryHeap::new();
        for (score, index) in [(0.8, 0), (0.9, 1), (0.7, 2), (1.0, 3)] {
            heap.push(ScoredIndex { score, index });
        }
        while heap.len() > 2 {
            heap.pop();
        }
        let sorted_k = heap.into_sorted_vec();
        assert_eq!(sorted_k.len(), 2);
        assert_eq!(sorted_k[0].score, 1.0);
        assert_eq!(sorted_k[1].score, 0.9);

        let nan_score = ScoredIndex { score: Float::NAN, index: 0 };
        let regular = ScoredIndex { score: 0.5, index: 1 };
        assert_eq!(nan_score.cmp(&regular), Ordering::Less);
        assert_eq!(regular.cmp(&nan_score), Ordering::Greater);
    }

    #[test]
    fn upsert_and_query() -> Result<()> {
        let mut store = VectorStore::new(3);

        let (updated, inserted) = store.upsert(vec![
            entry("pomodori", "Pomodoro", vec![1.0, 2.0, 3.0]),
            entry("riso", "Riso", vec![-4.0, 5.0, 6.0]),
        ])?;
        assert!(updated.is_empty());
        assert_eq!(inserted.len(), 2);

        // Re-upserting an entry rewrites its vector and canonical in place.
        let (updated, inserted) = store.upsert(vec![
            entry("pomodori", "Pomodoro fresco", vec![1.1, 2.1, 3.1]),
            entry("gamberi", "Gamberi", vec![7.0, 8.0, -9.0]),
        ])?;
        assert_eq!(updated.len(), 1);
        assert_eq!(inserted.len(), 1);
        assert_eq!(store.len(), 3);

        let results = store.query(&[1.0, 2.0, 3.0], 1, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry, "pomodori");
        assert_eq!(results[0].canonical, "Pomodoro fresco");
        assert!(results[0].score > 0.95);

        Ok(())
    }

    #[test]
    fn upsert_rejects_wrong_dimension() {
        let mut store = VectorStore::new(3);
        let result = store.upsert(vec![entry("a", "A", vec![1.0, 2.0])]);
        assert!(result.is_err());
    }

    #[test]
    fn query_respects_score_floor() -> Result<()> {
        let mut store = VectorStore::new(2);
        store.upsert(vec![
            entry("a", "A", vec![1.0, 0.0]),
            entry("b", "B", vec![0.0, 1.0]),
        ])?;

        let results = store.query(&[1.0, 0.0], 2, Some(0.5));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry, "a");
        Ok(())
    }

    #[test]
    fn save_and_load_round_trip() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let mut store = VectorStore::new(2);
        store.upsert(vec![
            entry("pomodori", "Pomodoro", vec![3.0, 4.0]),
            entry("riso", "Riso", vec![0.0, 1.0]),
        ])?;
        store.save(temp_file.path())?;

        let loaded = VectorStore::load(temp_file.path(), 2)?;
        assert_eq!(loaded.len(), 2);
        let results = loaded.query(&[3.0, 4.0], 1, None);
        assert_eq!(results[0].canonical, "Pomodoro");
        assert!(results[0].score > 0.99);
        Ok(())
    }

    #[test]
    fn normalize_zero_vector_stays_zero() {
        assert_eq!(normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn normalize_non_zero_vector() {
        let normalized = normalize(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }
}
