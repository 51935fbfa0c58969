//! Storage layer abstractions for GalleryDB.
//!
//! The feature store is the authoritative copy of every image record and
//! feature vector. Both search indexes are derived from it and can be
//! rebuilt from [`FeatureStore::completed_features`] at any time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      GalleryDB                               │
//! │                         │                                    │
//! │                         ▼                                    │
//! │              ┌─────────────────────┐                        │
//! │              │    FeatureStore     │  ← Trait               │
//! │              └─────────────────────┘                        │
//! │                         ▲                                    │
//! │                         │                                    │
//! │                  ┌──────┴──────┐                            │
//! │                  │ RedbStorage │                            │
//! │                  └─────────────┘                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod redb;
pub mod schema;

pub use self::redb::RedbStorage;
pub use schema::{DatabaseMetadata, SCHEMA_VERSION};

use std::path::Path;

use crate::color::Rgb;
use crate::error::{NotFoundError, Result};
use crate::image::ImageRecord;
use crate::types::{Embedding, ImageId};

/// Index inputs for one completed image.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredFeatures {
    /// Image identifier.
    pub id: ImageId,
    /// Feature vector.
    pub embedding: Embedding,
    /// Dominant colors.
    pub colors: Vec<Rgb>,
}

/// Durable mapping from image identifier to its record.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow the database to be shared
/// across threads. Every mutation is a single transaction, so a concurrent
/// reader sees a record either entirely before or entirely after a write.
pub trait FeatureStore: Send + Sync {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Returns the database metadata.
    fn metadata(&self) -> &DatabaseMetadata;

    /// Returns the path to the database file, if file-backed.
    fn path(&self) -> Option<&Path>;

    // =========================================================================
    // Records
    // =========================================================================

    /// Allocates a fresh image identifier.
    ///
    /// Identifiers increase monotonically and are never reused, including
    /// after deletion.
    fn next_id(&self) -> Result<ImageId>;

    /// Inserts or replaces a record (and its feature vector) by identifier.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the record is invalid: wrong vector
    /// dimension, completed without a vector, too many colors or tags.
    fn put(&self, record: &ImageRecord) -> Result<()>;

    /// Returns the record with its feature vector, or `None`.
    fn find(&self, id: ImageId) -> Result<Option<ImageRecord>>;

    /// Returns the record with its feature vector.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError::Image` if absent.
    fn get(&self, id: ImageId) -> Result<ImageRecord> {
        self.find(id)?
            .ok_or_else(|| NotFoundError::image(id).into())
    }

    /// Removes a record. Returns whether it existed; never fails on absence.
    fn delete(&self, id: ImageId) -> Result<bool>;

    /// Returns one page of records, newest upload first.
    ///
    /// Pages are 1-based. Ties on upload time put the higher id first.
    fn list(&self, page: usize, page_size: usize) -> Result<Vec<ImageRecord>>;

    /// Returns every record, newest upload first.
    fn list_all(&self) -> Result<Vec<ImageRecord>>;

    /// Returns every record without its feature vector, newest upload first.
    ///
    /// For scans that only look at metadata (text search, status counts).
    fn list_all_metadata(&self) -> Result<Vec<ImageRecord>>;

    /// Returns the number of stored records.
    fn count(&self) -> Result<u64>;

    /// Returns the index inputs of every completed record, by ascending id.
    fn completed_features(&self) -> Result<Vec<StoredFeatures>>;
}
