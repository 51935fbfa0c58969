//! Configuration types for GalleryDB.
//!
//! The [`Config`] struct controls database behavior including:
//! - Feature vector dimension (fixed at database creation)
//! - Durability settings
//! - Vector index, color index and ingestion tuning
//!
//! # Example
//! ```rust
//! use gallerydb::{Config, SyncMode};
//!
//! // Use defaults (512-dimensional vectors)
//! let config = Config::default();
//!
//! // Customize for production
//! let config = Config {
//!     dimension: 768,
//!     sync_mode: SyncMode::Normal,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Upper bound on the feature vector dimension.
pub const MAX_DIMENSION: usize = 4096;

/// Database configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use gallerydb::Config;
///
/// let config = Config {
///     cache_size_mb: 256,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Feature vector dimension D.
    ///
    /// Stored in the database metadata on creation; reopening with a
    /// different value fails.
    pub dimension: usize,

    /// Cache size in megabytes for the storage engine.
    ///
    /// Default: 64 MB
    pub cache_size_mb: usize,

    /// Durability mode for write operations.
    pub sync_mode: SyncMode,

    /// Vector index selection and HNSW tuning.
    pub vector: VectorIndexConfig,

    /// Color index quantization and search caps.
    pub color: ColorIndexConfig,

    /// Feature extraction worker pool.
    pub ingestion: IngestionConfig,

    /// Largest page size accepted by listing and text search.
    pub max_page_size: usize,

    /// Largest result count accepted by similar and color queries.
    pub max_result_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // 512 matches CLIP ViT-B/32 image embeddings
            dimension: 512,
            cache_size_mb: 64,
            sync_mode: SyncMode::Normal,
            vector: VectorIndexConfig::default(),
            color: ColorIndexConfig::default(),
            ingestion: IngestionConfig::default(),
            max_page_size: 100,
            max_result_limit: 100,
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Config for the given feature vector dimension.
    ///
    /// # Example
    /// ```rust
    /// use gallerydb::Config;
    ///
    /// let config = Config::with_dimension(768);
    /// assert_eq!(config.dimension, 768);
    /// ```
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `GalleryDB::open()`.
    ///
    /// # Errors
    /// Returns `ValidationError` if any numeric setting is out of range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.dimension == 0 {
            return Err(ValidationError::invalid_field(
                "dimension",
                "must be greater than 0",
            ));
        }
        if self.dimension > MAX_DIMENSION {
            return Err(ValidationError::invalid_field(
                "dimension",
                format!("must not exceed {}", MAX_DIMENSION),
            ));
        }

        if self.cache_size_mb == 0 {
            return Err(ValidationError::invalid_field(
                "cache_size_mb",
                "must be greater than 0",
            ));
        }

        if self.max_page_size == 0 {
            return Err(ValidationError::invalid_field(
                "max_page_size",
                "must be greater than 0",
            ));
        }

        if self.max_result_limit == 0 {
            return Err(ValidationError::invalid_field(
                "max_result_limit",
                "must be greater than 0",
            ));
        }

        self.vector.validate()?;
        self.color.validate()?;
        self.ingestion.validate()?;

        Ok(())
    }
}

/// Vector index configuration.
///
/// Below `exact_threshold` entries the index is an exact linear scan; at or
/// above it the index is rebuilt as an HNSW graph.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorIndexConfig {
    /// Entry count at which the exact index is replaced by HNSW.
    pub exact_threshold: usize,

    /// HNSW graph parameters.
    pub hnsw: HnswConfig,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            exact_threshold: 50_000,
            hnsw: HnswConfig::default(),
        }
    }
}

impl VectorIndexConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.exact_threshold == 0 {
            return Err(ValidationError::invalid_field(
                "vector.exact_threshold",
                "must be greater than 0",
            ));
        }
        self.hnsw.validate()
    }
}

/// HNSW graph tuning parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct HnswConfig {
    /// Maximum neighbors per node (M).
    pub max_nb_connection: usize,

    /// Candidate list size while building the graph.
    pub ef_construction: usize,

    /// Candidate list size while searching (raised to k when k is larger).
    pub ef_search: usize,

    /// Number of graph layers (hnsw_rs caps this at 16).
    pub max_layer: usize,

    /// Capacity hint for the graph.
    pub max_elements: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_nb_connection: 16,
            ef_construction: 200,
            ef_search: 100,
            max_layer: 16,
            max_elements: 100_000,
        }
    }
}

impl HnswConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_nb_connection == 0 {
            return Err(ValidationError::invalid_field(
                "vector.hnsw.max_nb_connection",
                "must be greater than 0",
            ));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(ValidationError::invalid_field(
                "vector.hnsw",
                "ef_construction and ef_search must be greater than 0",
            ));
        }
        if self.max_layer == 0 || self.max_layer > 16 {
            return Err(ValidationError::invalid_field(
                "vector.hnsw.max_layer",
                "must be between 1 and 16",
            ));
        }
        Ok(())
    }
}

/// Color index configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorIndexConfig {
    /// Edge length of a CIELAB grid cell, in ΔE units.
    pub cell_size: f32,

    /// Dominant colors indexed per image.
    pub max_colors: usize,

    /// Upper bound on candidates examined by one query once `limit`
    /// results are known.
    pub max_candidates: usize,
}

impl Default for ColorIndexConfig {
    fn default() -> Self {
        Self {
            cell_size: 10.0,
            max_colors: 5,
            max_candidates: 20_000,
        }
    }
}

impl ColorIndexConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !(self.cell_size.is_finite() && self.cell_size >= 1.0) {
            return Err(ValidationError::invalid_field(
                "color.cell_size",
                "must be a finite value of at least 1.0",
            ));
        }
        if self.max_colors == 0 {
            return Err(ValidationError::invalid_field(
                "color.max_colors",
                "must be greater than 0",
            ));
        }
        if self.max_candidates == 0 {
            return Err(ValidationError::invalid_field(
                "color.max_candidates",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Feature extraction worker pool configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct IngestionConfig {
    /// Number of extraction worker threads.
    ///
    /// `0` runs extraction inline in the uploading thread, so `upload`
    /// returns only after every image reached a terminal status.
    pub workers: usize,

    /// Bounded queue length between uploaders and workers.
    pub queue_capacity: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
        }
    }
}

impl IngestionConfig {
    /// Returns a configuration that processes uploads inline.
    pub fn inline() -> Self {
        Self {
            workers: 0,
            ..Default::default()
        }
    }

    /// Returns true if uploads are processed in the calling thread.
    pub fn is_inline(&self) -> bool {
        self.workers == 0
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.workers > 0 && self.queue_capacity == 0 {
            return Err(ValidationError::invalid_field(
                "ingestion.queue_capacity",
                "must be greater than 0 when workers are enabled",
            ));
        }
        Ok(())
    }
}

/// Durability mode for write operations.
///
/// Controls the trade-off between write performance and crash safety.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Sync to disk on transaction commit.
    #[default]
    Normal,

    /// Async sync (faster writes, may lose recent data on crash).
    Fast,

    /// Sync with extra integrity checks on every commit (slowest).
    Paranoid,
}

impl SyncMode {
    /// Returns true if this mode adds integrity checks on every commit.
    pub fn is_paranoid(&self) -> bool {
        matches!(self, Self::Paranoid)
    }

    /// Returns true if this mode is async (may lose data on crash).
    pub fn is_fast(&self) -> bool {
        matches!(self, Self::Fast)
    }
}
