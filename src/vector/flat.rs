//! Exact nearest-neighbor index by linear scan.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::RwLock;

use crate::error::{GalleryDBError, Result};
use crate::types::ImageId;

use super::{check_vector, cosine_distance, lock_poisoned, IndexKind, Neighbor, VectorIndex};

/// Exact index: every query scores every stored vector.
///
/// Keeps only the best `k` candidates in a bounded max-heap, so a query is
/// O(n·D) time and O(k) extra space.
pub struct FlatIndex {
    vectors: RwLock<BTreeMap<ImageId, Vec<f32>>>,
    dimension: usize,
}

/// Heap entry ordered by (distance, id) so the heap top is the worst kept.
struct Candidate(Neighbor);

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.ordering(&other.0)
    }
}

impl FlatIndex {
    /// Creates an empty index for vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: RwLock::new(BTreeMap::new()),
            dimension,
        }
    }

    /// Builds an index from `(id, vector)` pairs.
    pub fn build(dimension: usize, entries: Vec<(ImageId, Vec<f32>)>) -> Result<Self> {
        let mut vectors = BTreeMap::new();
        for (id, vector) in entries {
            check_vector(dimension, &vector)?;
            vectors.insert(id, vector);
        }
        Ok(Self {
            vectors: RwLock::new(vectors),
            dimension,
        })
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&self, id: ImageId, vector: &[f32]) -> Result<()> {
        check_vector(self.dimension, vector)?;
        let mut vectors = self.vectors.write().map_err(|_| lock_poisoned())?;
        vectors.insert(id, vector.to_vec());
        Ok(())
    }

    fn remove(&self, id: ImageId) -> Result<()> {
        let mut vectors = self.vectors.write().map_err(|_| lock_poisoned())?;
        vectors.remove(&id);
        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        check_vector(self.dimension, vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.vectors.read().map_err(|_| lock_poisoned())?;
        if vectors.is_empty() {
            return Err(GalleryDBError::EmptyIndex);
        }

        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        for (&id, stored) in vectors.iter() {
            let candidate = Candidate(Neighbor {
                id,
                distance: cosine_distance(vector, stored),
            });
            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        }

        Ok(heap.into_sorted_vec().into_iter().map(|c| c.0).collect())
    }

    fn get(&self, id: ImageId) -> Option<Vec<f32>> {
        self.vectors.read().ok()?.get(&id).cloned()
    }

    fn contains(&self, id: ImageId) -> bool {
        self.vectors
            .read()
            .ok()
            .is_some_and(|v| v.contains_key(&id))
    }

    fn len(&self) -> usize {
        self.vectors.read().map_or(0, |v| v.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Exact
    }
}
