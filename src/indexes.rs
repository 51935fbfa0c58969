//! The pair of derived search indexes and their maintenance gate.
//!
//! ```text
//!   ingestion / delete              rebuild
//!          │                           │
//!    gate.read()                 gate.write()
//!          │                           │
//!   ┌──────┴──────────────┐     build new indexes from the store
//!   │ vectors snapshot    │     off to the side, then swap
//!   │ colors              │
//!   └─────────────────────┘
//!          ▲
//!   queries take the current snapshot and never touch the gate
//! ```

use std::sync::{Arc, RwLock, RwLockReadGuard};

use serde::Serialize;
use tracing::{info, instrument};

use crate::color::{ColorIndex, Rgb};
use crate::config::{Config, VectorIndexConfig};
use crate::error::{GalleryDBError, Result};
use crate::storage::FeatureStore;
use crate::types::ImageId;
use crate::vector::{build_index, FlatIndex, IndexKind, VectorIndex};

/// Counts reported by a rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Completed images loaded into the vector index.
    pub vectors: usize,
    /// Images registered in the color index.
    pub colors: usize,
    /// Vector index implementation after the rebuild.
    pub kind: IndexKind,
}

pub(crate) struct Indexes {
    vectors: RwLock<Arc<dyn VectorIndex>>,
    colors: ColorIndex,
    gate: RwLock<()>,
    dimension: usize,
    config: VectorIndexConfig,
}

impl Indexes {
    /// Creates empty indexes.
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            vectors: RwLock::new(Arc::new(FlatIndex::new(config.dimension))),
            colors: ColorIndex::new(&config.color),
            gate: RwLock::new(()),
            dimension: config.dimension,
            config: config.vector.clone(),
        }
    }

    /// Returns the current vector index snapshot.
    pub(crate) fn vectors(&self) -> Result<Arc<dyn VectorIndex>> {
        let current = self
            .vectors
            .read()
            .map_err(|_| GalleryDBError::index("Vector snapshot lock poisoned"))?;
        Ok(Arc::clone(&current))
    }

    pub(crate) fn colors(&self) -> &ColorIndex {
        &self.colors
    }

    fn mutation_gate(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.gate
            .read()
            .map_err(|_| GalleryDBError::index("Index maintenance gate poisoned"))
    }

    /// Adds (or replaces) a completed image in both indexes.
    pub(crate) fn insert(&self, id: ImageId, embedding: &[f32], colors: &[Rgb]) -> Result<()> {
        let _gate = self.mutation_gate()?;
        self.vectors()?.insert(id, embedding)?;
        self.colors.index(id, colors)?;
        Ok(())
    }

    /// Removes an image from both indexes. No-op if absent.
    pub(crate) fn remove(&self, id: ImageId) -> Result<()> {
        let _gate = self.mutation_gate()?;
        self.vectors()?.remove(id)?;
        self.colors.remove(id)?;
        Ok(())
    }

    /// Rebuilds both indexes from the completed records in `store`.
    ///
    /// Mutations wait until the swap; queries keep using the previous
    /// snapshot meanwhile.
    #[instrument(skip(self, store))]
    pub(crate) fn rebuild_from(&self, store: &dyn FeatureStore) -> Result<RebuildReport> {
        let _gate = self
            .gate
            .write()
            .map_err(|_| GalleryDBError::index("Index maintenance gate poisoned"))?;

        let features = store.completed_features()?;
        let color_entries: Vec<(ImageId, Vec<Rgb>)> = features
            .iter()
            .filter(|f| !f.colors.is_empty())
            .map(|f| (f.id, f.colors.clone()))
            .collect();
        let color_count = color_entries.len();
        let vector_entries: Vec<(ImageId, Vec<f32>)> = features
            .into_iter()
            .map(|f| (f.id, f.embedding))
            .collect();

        let fresh = build_index(self.dimension, &self.config, vector_entries)?;
        let report = RebuildReport {
            vectors: fresh.len(),
            colors: color_count,
            kind: fresh.kind(),
        };

        self.colors.rebuild(color_entries)?;
        *self
            .vectors
            .write()
            .map_err(|_| GalleryDBError::index("Vector snapshot lock poisoned"))? = fresh;

        info!(
            vectors = report.vectors,
            colors = report.colors,
            kind = ?report.kind,
            "Indexes rebuilt"
        );
        Ok(report)
    }

    /// Returns true once the exact index has grown past the HNSW threshold.
    pub(crate) fn needs_promotion(&self) -> bool {
        self.vectors().is_ok_and(|v| {
            v.kind() == IndexKind::Exact && v.len() >= self.config.exact_threshold
        })
    }

    /// Switches to HNSW if the exact index has outgrown its threshold.
    pub(crate) fn maybe_promote(&self, store: &dyn FeatureStore) -> Result<Option<RebuildReport>> {
        if !self.needs_promotion() {
            return Ok(None);
        }
        info!(
            threshold = self.config.exact_threshold,
            "Promoting vector index to HNSW"
        );
        let report = self.rebuild_from(store)?;
        Ok(Some(report))
    }
}
