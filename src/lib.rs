//! # GalleryDB
//!
//! Embedded image similarity and color-filter search engine for photo
//! galleries.
//!
//! GalleryDB stores uploaded images' metadata and extracted features, and
//! answers the queries a gallery front end needs: paged listing, text
//! search, "more like this" similarity search and "filter by dominant
//! color".
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gallerydb::{Caller, Config, GalleryDB, NewImage};
//!
//! // Open or create a database with your feature extractor
//! let db = GalleryDB::open_with_extractor("./gallery.db", Config::default(), Arc::new(my_extractor))?;
//!
//! // Upload on behalf of a verified caller
//! let caller = Caller::new("alice");
//! let uploaded = db.upload(Some(&caller), vec![NewImage::new("beach.jpg", bytes)])?;
//!
//! // Query
//! let similar = db.find_similar(Some(&caller), uploaded[0].id, 10)?;
//! let reds = db.filter_by_color(Some(&caller), "#FF0000", 20)?;
//! let page = db.search_by_text(Some(&caller), "sunset beach", 1, 20)?;
//!
//! db.close()?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Image lifecycle
//!
//! Every upload is stored immediately as `pending`. A worker then runs the
//! [`FeatureExtractor`](ingest::FeatureExtractor) and commits the image as
//! `completed` (feature vector, tags, description, dominant colors) or
//! `failed` with the extractor's error. Only completed images take part in
//! similarity and color search; failed ones stay listable.
//!
//! ### Indexes
//!
//! - **Vector index**: exact scan for small galleries, HNSW above
//!   `vector.exact_threshold` images. Cosine distance.
//! - **Color index**: dominant colors bucketed on a CIELAB grid, searched
//!   ring by ring outward from the target color.
//!
//! Both are derived from the feature store and rebuilt on open.
//!
//! ## Thread Safety
//!
//! `GalleryDB` is `Send + Sync` and can be shared across threads using `Arc`.
//! The database uses MVCC for concurrent reads with exclusive write locking.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod auth;
mod config;
mod db;
mod error;
mod indexes;
mod types;

pub mod color;
pub mod image;
pub mod ingest;
pub mod search;
pub mod storage;

/// Vector indexes for nearest-neighbor search over feature vectors.
pub mod vector;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main database interface
pub use db::{GalleryDB, GalleryStats, INTERRUPTED_ERROR};

// Caller identity
pub use auth::Caller;

// Configuration
pub use config::{
    ColorIndexConfig, Config, HnswConfig, IngestionConfig, SyncMode, VectorIndexConfig,
};

// Error handling
pub use error::{GalleryDBError, NotFoundError, Result, StorageError, ValidationError};

// Core types
pub use types::{Embedding, ImageId, Timestamp, UserId};

// Domain types
pub use color::{Lab, Rgb};
pub use image::{ExtractedFeatures, ImageRecord, NewImage, ProcessingStatus};
pub use indexes::RebuildReport;
pub use ingest::{FeatureExtractor, UnavailableExtractor};

// Search
pub use search::{ScoredImage, SearchPage};

// Storage (for advanced users)
pub use storage::DatabaseMetadata;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common GalleryDB usage.
///
/// ```rust
/// use gallerydb::prelude::*;
/// ```
pub mod prelude {
    pub use crate::auth::Caller;
    pub use crate::config::{Config, SyncMode};
    pub use crate::db::GalleryDB;
    pub use crate::error::{GalleryDBError, Result};
    pub use crate::image::{ExtractedFeatures, ImageRecord, NewImage, ProcessingStatus};
    pub use crate::ingest::FeatureExtractor;
    pub use crate::search::{ScoredImage, SearchPage};
    pub use crate::types::ImageId;
}
