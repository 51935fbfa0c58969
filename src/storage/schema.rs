//! Database schema definitions and versioning.
//!
//! This module defines the table structure for the redb storage engine.
//! All table definitions are compile-time constants to ensure consistency.
//!
//! # Schema Versioning
//!
//! The schema version is stored in the metadata table. When opening an
//! existing database, we check the version and fail if it doesn't match.
//!
//! # Table Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ METADATA_TABLE                                               │
//! │   Key: &str                                                  │
//! │   Value: &[u8]                                               │
//! │   Entries: "db_metadata"   -> DatabaseMetadata (bincode)     │
//! │            "next_image_id" -> u64 (little-endian)            │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ IMAGES_TABLE                                                 │
//! │   Key: u64 (ImageId)                                         │
//! │   Value: &[u8] (bincode-serialized ImageRecord, no vector)  │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ EMBEDDINGS_TABLE                                             │
//! │   Key: u64 (ImageId)                                         │
//! │   Value: &[u8] (raw little-endian f32, dimension * 4 bytes) │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ IMAGES_BY_TIME_TABLE                                         │
//! │   Key: &[u8; 16] (uploaded_at ‖ ImageId, both big-endian)   │
//! │   Value: () (index only)                                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::types::{ImageId, Timestamp};

/// Current schema version.
///
/// Increment this when making breaking changes to the schema.
/// The database will refuse to open if versions don't match.
pub const SCHEMA_VERSION: u32 = 1;

/// Maximum file name length in characters.
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Maximum length of a stored file path.
pub const MAX_PATH_LENGTH: usize = 1024;

/// Maximum description size in bytes (10 KB).
pub const MAX_DESCRIPTION_SIZE: usize = 10 * 1024;

/// Maximum number of tags per image.
pub const MAX_TAGS: usize = 50;

/// Maximum length of a single tag.
pub const MAX_TAG_LENGTH: usize = 100;

/// Maximum size of one uploaded image (50 MB).
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Maximum number of images in one upload call.
pub const MAX_UPLOAD_BATCH: usize = 100;

// ============================================================================
// Table Definitions
// ============================================================================

/// Metadata table for database-level information.
///
/// Key is a string identifier, value is serialized data.
pub const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Images table.
///
/// Key: ImageId
/// Value: bincode-serialized ImageRecord (without feature vector)
pub const IMAGES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("images");

/// Feature vectors table.
///
/// Stored separately from images to keep the main table compact.
/// Only completed images have a row.
pub const EMBEDDINGS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("embeddings");

/// Index: images by upload time.
///
/// Iterated in reverse for newest-first listing.
pub const IMAGES_BY_TIME_TABLE: TableDefinition<&[u8; 16], ()> =
    TableDefinition::new("images_by_time");

/// Metadata key for [`DatabaseMetadata`].
pub const METADATA_KEY: &str = "db_metadata";

/// Metadata key for the identifier counter.
pub const NEXT_ID_KEY: &str = "next_image_id";

// ============================================================================
// Database Metadata
// ============================================================================

/// Database metadata stored in the metadata table.
///
/// This is serialized with bincode and stored under the key "db_metadata".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    /// Schema version for compatibility checking.
    pub schema_version: u32,

    /// Feature vector dimension configured for this database.
    ///
    /// Once set, this cannot be changed without recreating the database.
    pub dimension: u32,

    /// Timestamp when the database was created.
    pub created_at: Timestamp,

    /// Last time the database was opened (updated on each open).
    pub last_opened_at: Timestamp,
}

impl DatabaseMetadata {
    /// Creates new metadata for a fresh database.
    pub fn new(dimension: usize) -> Self {
        let now = Timestamp::now();
        Self {
            schema_version: SCHEMA_VERSION,
            dimension: dimension as u32,
            created_at: now,
            last_opened_at: now,
        }
    }

    /// Updates the last_opened_at timestamp.
    pub fn touch(&mut self) {
        self.last_opened_at = Timestamp::now();
    }

    /// Checks if this metadata is compatible with the current schema.
    pub fn is_compatible(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}

// ============================================================================
// Key Encoding Helpers
// ============================================================================

/// Encodes an (uploaded_at, ImageId) pair for the time index.
///
/// Format: [timestamp: 8 bytes][image_id_be: 8 bytes] = 16 bytes. The
/// timestamp's sign bit is flipped so that lexicographic ordering matches
/// numeric ordering for negative values too.
#[inline]
pub fn encode_time_key(uploaded_at: Timestamp, id: ImageId) -> [u8; 16] {
    let mut key = [0u8; 16];
    let ts = (uploaded_at.as_millis() as u64) ^ (1 << 63);
    key[..8].copy_from_slice(&ts.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

/// Decodes the image id from a time index key.
#[inline]
pub fn decode_time_key(key: &[u8; 16]) -> (Timestamp, ImageId) {
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&key[..8]);
    let mut id = [0u8; 8];
    id.copy_from_slice(&key[8..]);
    let millis = (u64::from_be_bytes(ts) ^ (1 << 63)) as i64;
    (Timestamp::from_millis(millis), ImageId::from_be_bytes(id))
}

/// Encodes a feature vector as raw little-endian f32 bytes.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decodes raw little-endian f32 bytes.
pub fn decode_embedding(bytes: &[u8], dimension: usize) -> Result<Vec<f32>, StorageError> {
    if bytes.len() != dimension * 4 {
        return Err(StorageError::corrupted(format!(
            "Feature vector has {} bytes, expected {}",
            bytes.len(),
            dimension * 4
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
