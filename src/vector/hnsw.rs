//! HNSW vector index implementation using hnsw_rs.
//!
//! Wraps `hnsw_rs::Hnsw<f32, DistCosine>` with:
//! - Bidirectional `ImageId` ↔ `usize` ID mapping
//! - Soft-delete via `HashSet` + filtered search
//! - Exact re-scoring of graph candidates
//!
//! # Thread Safety
//!
//! The `hnsw_rs::Hnsw` graph uses `parking_lot::RwLock` internally,
//! so `insert()` takes `&self`. Our metadata (`IndexState`) is
//! protected by `std::sync::RwLock`.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use hnsw_rs::prelude::*;

use crate::config::HnswConfig;
use crate::error::{GalleryDBError, Result};
use crate::types::ImageId;

use super::{check_vector, cosine_distance, lock_poisoned, IndexKind, Neighbor, VectorIndex};

/// Extra graph candidates fetched per query before exact re-scoring.
const RESCORE_SLACK: usize = 8;

/// Approximate nearest-neighbor index backed by `hnsw_rs`.
///
/// HNSW graphs don't support point removal, so `remove` and replacing
/// `insert` soft-delete the old graph node. Every live vector is also kept
/// by id; graph hits are re-scored with the exact cosine distance and
/// sorted by (distance, id), so results are deterministic for a given
/// candidate set.
///
/// Ties are only ordered by id among the candidates the graph returned.
/// When more vectors share a distance than fit in `k`, which of them make
/// the cut depends on graph traversal, not on id order as with
/// [`FlatIndex`](super::FlatIndex). A zero query vector is the usual case:
/// every stored vector sits at distance 1.0.
pub struct HnswIndex {
    /// The underlying HNSW graph. Uses `'static` lifetime because
    /// all data is heap-owned (not memory-mapped).
    hnsw: Hnsw<'static, f32, DistCosine>,

    state: RwLock<IndexState>,

    config: HnswConfig,

    dimension: usize,
}

#[derive(Debug, Default)]
struct IndexState {
    /// Forward map: ImageId → live internal node.
    id_to_internal: HashMap<ImageId, usize>,

    /// Reverse map: internal node → ImageId. Indexed by node id.
    internal_to_id: Vec<ImageId>,

    /// Soft-deleted internal nodes (excluded from search).
    deleted: HashSet<usize>,

    /// Live vectors, for re-scoring and `get`.
    vectors: HashMap<ImageId, Vec<f32>>,
}

impl IndexState {
    /// Allocates a node for `id`, soft-deleting its previous node.
    fn assign(&mut self, id: ImageId, vector: Vec<f32>) -> usize {
        let internal_id = self.internal_to_id.len();
        self.internal_to_id.push(id);
        if let Some(old) = self.id_to_internal.insert(id, internal_id) {
            self.deleted.insert(old);
        }
        self.vectors.insert(id, vector);
        internal_id
    }
}

impl HnswIndex {
    /// Creates a new empty HNSW index.
    ///
    /// # Arguments
    ///
    /// * `dimension` - Expected vector dimension (validated on insert)
    /// * `config` - HNSW tuning parameters
    pub fn new(dimension: usize, config: &HnswConfig) -> Self {
        Self::with_capacity(dimension, config, config.max_elements)
    }

    fn with_capacity(dimension: usize, config: &HnswConfig, capacity: usize) -> Self {
        let hnsw = Hnsw::new(
            config.max_nb_connection,
            capacity.max(1),
            config.max_layer,
            config.ef_construction,
            DistCosine,
        );

        Self {
            hnsw,
            state: RwLock::new(IndexState::default()),
            config: config.clone(),
            dimension,
        }
    }

    /// Builds an index from `(id, vector)` pairs using parallel insertion.
    ///
    /// Later duplicates of an id replace earlier ones.
    pub fn build(
        dimension: usize,
        config: &HnswConfig,
        entries: Vec<(ImageId, Vec<f32>)>,
    ) -> Result<Self> {
        for (_, vector) in &entries {
            check_vector(dimension, vector)?;
        }

        let index = Self::with_capacity(
            dimension,
            config,
            config.max_elements.max(entries.len()),
        );
        if entries.is_empty() {
            return Ok(index);
        }

        let mut state = index.state.write().map_err(|_| lock_poisoned())?;
        let mut batch: Vec<(usize, ImageId)> = Vec::with_capacity(entries.len());
        for (id, vector) in entries {
            let internal_id = state.assign(id, vector);
            batch.push((internal_id, id));
        }

        // Skip nodes already superseded within the batch
        let items: Vec<(&Vec<f32>, usize)> = batch
            .iter()
            .filter(|(internal_id, _)| !state.deleted.contains(internal_id))
            .filter_map(|(internal_id, id)| state.vectors.get(id).map(|v| (v, *internal_id)))
            .collect();

        // Parallel bulk insert (uses rayon internally)
        index.hnsw.parallel_insert(&items);
        drop(items);
        drop(state);

        Ok(index)
    }

    /// Returns the total number of graph nodes (including soft-deleted).
    pub fn total_count(&self) -> usize {
        self.hnsw.get_nb_point()
    }

    /// Returns the number of soft-deleted graph nodes.
    pub fn deleted_count(&self) -> usize {
        self.state.read().map_or(0, |s| s.deleted.len())
    }
}

// ==========================================================================
// VectorIndex trait implementation
// ==========================================================================

impl VectorIndex for HnswIndex {
    fn insert(&self, id: ImageId, vector: &[f32]) -> Result<()> {
        check_vector(self.dimension, vector)?;

        let mut state = self.state.write().map_err(|_| lock_poisoned())?;
        let internal_id = state.assign(id, vector.to_vec());

        // The graph node is added while the state lock is held so a
        // concurrent query never maps a node to a half-registered id.
        self.hnsw.insert((vector, internal_id));
        Ok(())
    }

    fn remove(&self, id: ImageId) -> Result<()> {
        let mut state = self.state.write().map_err(|_| lock_poisoned())?;
        if let Some(internal_id) = state.id_to_internal.remove(&id) {
            state.deleted.insert(internal_id);
            state.vectors.remove(&id);
        }
        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        check_vector(self.dimension, vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read().map_err(|_| lock_poisoned())?;
        if state.id_to_internal.is_empty() {
            return Err(GalleryDBError::EmptyIndex);
        }

        let fetch = k
            .saturating_add(RESCORE_SLACK)
            .min(state.id_to_internal.len());
        let ef = self.config.ef_search.max(fetch);

        // Use filtered search to exclude soft-deleted entries.
        // We create a concrete closure (not a trait object) so it
        // auto-implements hnsw_rs::FilterT via the blanket impl.
        let deleted_ref = &state.deleted;
        let filter_fn = |id: &usize| -> bool { !deleted_ref.contains(id) };
        let hits = if state.deleted.is_empty() {
            self.hnsw.search(vector, fetch, ef)
        } else {
            self.hnsw.search_filter(vector, fetch, ef, Some(&filter_fn))
        };

        let mut neighbors: Vec<Neighbor> = hits
            .into_iter()
            .filter_map(|hit| {
                let id = *state.internal_to_id.get(hit.d_id)?;
                let stored = state.vectors.get(&id)?;
                Some(Neighbor {
                    id,
                    distance: cosine_distance(vector, stored),
                })
            })
            .collect();

        neighbors.sort_by(Neighbor::ordering);
        neighbors.dedup_by_key(|n| n.id);
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn get(&self, id: ImageId) -> Option<Vec<f32>> {
        self.state.read().ok()?.vectors.get(&id).cloned()
    }

    fn contains(&self, id: ImageId) -> bool {
        self.state
            .read()
            .ok()
            .is_some_and(|s| s.id_to_internal.contains_key(&id))
    }

    fn len(&self) -> usize {
        self.state.read().map_or(0, |s| s.id_to_internal.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Hnsw
    }
}

// ==========================================================================
// Tests
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::FlatIndex;

    fn test_config() -> HnswConfig {
        HnswConfig {
            max_nb_connection: 16,
            ef_construction: 200,
            ef_search: 100,
            max_layer: 16,
            max_elements: 1000,
        }
    }

    /// Generates a deterministic vector from a seed.
    /// Vectors with close seeds produce similar vectors.
    fn make_vector(seed: u64, dim: usize) -> Vec<f32> {
        (0..dim)
            .map(|i| (seed as f32 * 0.1 + i as f32 * 0.01).sin())
            .collect()
    }

    /// Pseudo-random vector spread over the whole sphere.
    fn scattered_vector(seed: u64, dim: usize) -> Vec<f32> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (0..dim)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 33) as f32 / (1u64 << 31) as f32) - 0.5
            })
            .collect()
    }

    #[test]
    fn test_new_index_is_empty() {
        let index = HnswIndex::new(16, &test_config());
        assert_eq!(index.len(), 0);
        assert_eq!(index.total_count(), 0);
        assert!(index.is_empty());
        assert_eq!(index.kind(), IndexKind::Hnsw);
    }

    #[test]
    fn test_insert_and_search() {
        let dim = 8;
        let index = HnswIndex::new(dim, &test_config());

        for i in 0..10u64 {
            index.insert(ImageId::new(i), &make_vector(i, dim)).unwrap();
        }
        assert_eq!(index.len(), 10);

        let results = index.query(&make_vector(5, dim), 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, ImageId::new(5));
        for w in results.windows(2) {
            assert!(w[0].distance <= w[1].distance, "Results not sorted by distance");
        }
    }

    #[test]
    fn test_replace_soft_deletes_old_node() {
        let dim = 4;
        let index = HnswIndex::new(dim, &test_config());
        let id = ImageId::new(1);

        index.insert(id, &make_vector(1, dim)).unwrap();
        index.insert(id, &make_vector(50, dim)).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.total_count(), 2);
        assert_eq!(index.deleted_count(), 1);
        assert_eq!(index.get(id), Some(make_vector(50, dim)));

        let results = index.query(&make_vector(1, dim), 5).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let index = HnswIndex::new(16, &test_config());
        let result = index.insert(ImageId::new(1), &[1.0f32; 8]);
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_remove_excludes_from_search() {
        let dim = 8;
        let index = HnswIndex::new(dim, &test_config());
        for i in 0..5u64 {
            index.insert(ImageId::new(i), &make_vector(i, dim)).unwrap();
        }

        index.remove(ImageId::new(0)).unwrap();
        assert_eq!(index.len(), 4);
        assert!(!index.contains(ImageId::new(0)));
        assert!(index.contains(ImageId::new(1)));

        let results = index.query(&make_vector(0, dim), 10).unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|n| n.id != ImageId::new(0)));
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let dim = 4;
        let index = HnswIndex::new(dim, &test_config());
        index.insert(ImageId::new(1), &make_vector(1, dim)).unwrap();

        let results = index.query(&make_vector(1, dim), 100).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_search_empty_index() {
        let index = HnswIndex::new(4, &test_config());
        let err = index.query(&make_vector(1, 4), 10).unwrap_err();
        assert!(err.is_empty_index());
        assert!(index.query(&make_vector(1, 4), 0).unwrap().is_empty());
    }

    #[test]
    fn test_build_from_entries() {
        let dim = 8;
        let entries: Vec<(ImageId, Vec<f32>)> = (0..20u64)
            .map(|i| (ImageId::new(i), make_vector(i, dim)))
            .collect();

        let index = HnswIndex::build(dim, &test_config(), entries).unwrap();
        assert_eq!(index.len(), 20);

        let results = index.query(&make_vector(10, dim), 5).unwrap();
        assert_eq!(results[0].id, ImageId::new(10));
    }

    #[test]
    fn test_build_empty() {
        let index = HnswIndex::build(16, &test_config(), vec![]).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_zero_query_ties_sorted_within_candidates() {
        let dim = 4;
        let index = HnswIndex::new(dim, &test_config());
        for i in 0..20u64 {
            index.insert(ImageId::new(i), &scattered_vector(i, dim)).unwrap();
        }

        // Every stored vector is at distance 1.0 from a zero query; which
        // three come back is up to the graph, but they are id-ordered.
        let results = index.query(&[0.0; 4], 3).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|n| n.distance == 1.0));
        for w in results.windows(2) {
            assert!(w[0].id < w[1].id);
        }
    }

    #[test]
    fn test_identical_vector_has_zero_distance() {
        let dim = 8;
        let index = HnswIndex::new(dim, &test_config());
        let vector = make_vector(42, dim);
        index.insert(ImageId::new(42), &vector).unwrap();

        let results = index.query(&vector, 1).unwrap();
        assert_eq!(results[0].id, ImageId::new(42));
        assert!(
            results[0].distance < 0.001,
            "Expected near-zero distance for identical vectors, got {}",
            results[0].distance
        );
    }

    #[test]
    fn test_recall_against_exact_scan() {
        let dim = 32;
        let n = 2000u64;
        let k = 10;
        let entries: Vec<(ImageId, Vec<f32>)> = (0..n)
            .map(|i| (ImageId::new(i), scattered_vector(i, dim)))
            .collect();

        let hnsw = HnswIndex::build(dim, &test_config(), entries.clone()).unwrap();
        let exact = FlatIndex::build(dim, entries).unwrap();

        let queries = 50u64;
        let mut found = 0usize;
        for q in 0..queries {
            let query = scattered_vector(1_000_000 + q, dim);
            let truth: HashSet<ImageId> = exact
                .query(&query, k)
                .unwrap()
                .into_iter()
                .map(|n| n.id)
                .collect();
            found += hnsw
                .query(&query, k)
                .unwrap()
                .iter()
                .filter(|n| truth.contains(&n.id))
                .count();
        }

        let recall = found as f64 / (queries as usize * k) as f64;
        assert!(recall >= 0.95, "recall {} below 0.95", recall);
    }
}
