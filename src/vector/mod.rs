//! Vector indexes for visual similarity search.
//!
//! This module provides a trait-based abstraction over nearest-neighbor
//! indexes, with two implementations chosen by corpus size:
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │         VectorIndex trait         │
//! └──────────┬───────────────┬───────┘
//!            │               │
//!    ┌───────┴──────┐ ┌──────┴───────┐
//!    │  FlatIndex   │ │  HnswIndex   │
//!    │ (exact scan) │ │  (hnsw_rs)   │
//!    └──────────────┘ └──────────────┘
//!     n < threshold     n ≥ threshold
//! ```
//!
//! Feature vectors stored in redb are the **source of truth**. Indexes are
//! derived, rebuildable structures; see [`build_index`].

mod flat;
mod hnsw;

pub use flat::FlatIndex;
pub use hnsw::HnswIndex;

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::VectorIndexConfig;
use crate::error::{GalleryDBError, NotFoundError, Result, ValidationError};
use crate::types::ImageId;

/// A nearest-neighbor result: image id and cosine distance to the query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    /// Matching image.
    pub id: ImageId,
    /// Cosine distance, 0.0 = same direction, 2.0 = opposite.
    pub distance: f32,
}

impl Neighbor {
    pub(crate) fn ordering(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Which implementation backs a vector index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Exact linear scan.
    Exact,
    /// Approximate HNSW graph.
    Hnsw,
}

/// Nearest-neighbor index over fixed-dimension feature vectors.
///
/// Implementations must be `Send + Sync` for use inside `GalleryDB`. All
/// mutating methods take `&self` and use interior mutability, so queries
/// share a read lock while writes are serialized internally.
pub trait VectorIndex: Send + Sync {
    /// Adds a vector, replacing any previous vector for `id`.
    fn insert(&self, id: ImageId, vector: &[f32]) -> Result<()>;

    /// Removes `id`. No-op if absent.
    fn remove(&self, id: ImageId) -> Result<()>;

    /// Returns up to `k` neighbors of `vector`, ascending by cosine
    /// distance, ties by ascending id.
    ///
    /// # Errors
    ///
    /// - `ValidationError::DimensionMismatch` if the query has the wrong
    ///   dimension
    /// - `GalleryDBError::EmptyIndex` if `k > 0` and nothing is indexed
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Returns the indexed vector for `id`.
    fn get(&self, id: ImageId) -> Option<Vec<f32>>;

    /// Returns true if `id` is indexed.
    fn contains(&self, id: ImageId) -> bool;

    /// Returns the number of indexed vectors.
    fn len(&self) -> usize;

    /// Returns true if nothing is indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the vector dimension this index accepts.
    fn dimension(&self) -> usize;

    /// Returns which implementation backs this index.
    fn kind(&self) -> IndexKind;

    /// Like [`query`](Self::query) using the stored vector of `id`, with
    /// `id` itself excluded from the results.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError::Image` if `id` is not indexed.
    fn query_similar_to(&self, id: ImageId, k: usize) -> Result<Vec<Neighbor>> {
        let vector = self
            .get(id)
            .ok_or_else(|| NotFoundError::image(id.to_string()))?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut neighbors = self.query(&vector, k.saturating_add(1))?;
        neighbors.retain(|n| n.id != id);
        neighbors.truncate(k);
        Ok(neighbors)
    }
}

/// Cosine distance `1 − cos(a, b)`.
///
/// If either vector has zero norm the distance is 1.0 (orthogonal).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let cos = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    (1.0 - cos) as f32
}

/// Checks a vector against the index dimension.
pub(crate) fn check_vector(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(ValidationError::dimension_mismatch(expected, vector.len()).into());
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(ValidationError::invalid_field(
            "vector",
            "must contain only finite values",
        )
        .into());
    }
    Ok(())
}

/// Builds the index implementation that fits `entries.len()`.
///
/// Below `config.exact_threshold` entries the result is a [`FlatIndex`],
/// otherwise an [`HnswIndex`].
pub fn build_index(
    dimension: usize,
    config: &VectorIndexConfig,
    entries: Vec<(ImageId, Vec<f32>)>,
) -> Result<Arc<dyn VectorIndex>> {
    let count = entries.len();
    let index: Arc<dyn VectorIndex> = if count >= config.exact_threshold {
        Arc::new(HnswIndex::build(dimension, &config.hnsw, entries)?)
    } else {
        Arc::new(FlatIndex::build(dimension, entries)?)
    };

    info!(
        entries = count,
        kind = ?index.kind(),
        "Vector index built"
    );
    Ok(index)
}

pub(crate) fn lock_poisoned() -> GalleryDBError {
    GalleryDBError::index("Vector index lock poisoned")
}
