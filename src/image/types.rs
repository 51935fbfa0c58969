//! Type definitions for gallery images.
//!
//! An **image record** is what the gallery knows about one uploaded
//! picture: where its files live, who uploaded it, the metadata produced by
//! feature extraction, and its processing status.
//!
//! # Lifecycle
//!
//! ```text
//! upload ──► Pending ──extraction ok──► Completed  (indexed)
//!               │
//!               └──extraction error──► Failed     (listable only)
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::types::{Embedding, ImageId, Timestamp, UserId};

// ============================================================================
// ProcessingStatus
// ============================================================================

/// Feature extraction status of an image.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Stored, waiting for (or undergoing) extraction.
    #[default]
    Pending,

    /// Features extracted and indexed.
    Completed,

    /// Extraction failed. Not retried automatically.
    Failed {
        /// Why extraction failed.
        error: String,
    },
}

impl ProcessingStatus {
    /// Creates a failed status.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    /// Returns true for `Pending`.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns true for `Completed`.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true for `Failed`.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the failure message, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }
}

// ============================================================================
// ImageRecord
// ============================================================================

/// A stored image and its extracted features.
///
/// The feature vector is persisted in its own table and is never part of
/// the serialized record (so it is also absent from JSON responses).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Unique identifier, allocated by the store.
    pub id: ImageId,

    /// Original file name as uploaded.
    pub filename: String,

    /// Storage path of the original file.
    pub original_path: String,

    /// Storage path of the thumbnail.
    pub thumbnail_path: String,

    /// Upload time.
    pub uploaded_at: Timestamp,

    /// Verified identity of the uploader.
    pub uploaded_by: UserId,

    /// Generated description (empty until extraction completes).
    pub description: String,

    /// Generated tags.
    pub tags: BTreeSet<String>,

    /// Dominant colors, most prevalent first.
    pub colors: Vec<Rgb>,

    /// Feature vector. Present iff `status` is `Completed`.
    #[serde(skip)]
    pub embedding: Option<Embedding>,

    /// Extraction status.
    pub status: ProcessingStatus,
}

impl ImageRecord {
    /// Creates a pending record with no extracted features.
    pub fn pending(
        id: ImageId,
        image: &NewImage,
        uploaded_by: UserId,
        uploaded_at: Timestamp,
    ) -> Self {
        Self {
            id,
            filename: image.filename.clone(),
            original_path: image.original_path.clone(),
            thumbnail_path: image.thumbnail_path.clone(),
            uploaded_at,
            uploaded_by,
            description: String::new(),
            tags: BTreeSet::new(),
            colors: Vec::new(),
            embedding: None,
            status: ProcessingStatus::Pending,
        }
    }

    /// Returns a copy of this record enriched with extracted features and
    /// marked completed.
    pub fn completed(&self, features: ExtractedFeatures) -> Self {
        Self {
            description: features.description,
            tags: features.tags.into_iter().collect(),
            colors: features.colors,
            embedding: Some(features.embedding),
            status: ProcessingStatus::Completed,
            ..self.clone()
        }
    }

    /// Returns a copy of this record marked failed, without features.
    pub fn failed(&self, error: impl Into<String>) -> Self {
        Self {
            embedding: None,
            status: ProcessingStatus::failed(error),
            ..self.clone()
        }
    }

    /// Returns true if extraction completed.
    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }
}

// ============================================================================
// NewImage / ExtractedFeatures
// ============================================================================

/// An image submitted for upload.
///
/// The caller has already written the original and thumbnail files; only
/// their paths are recorded. `bytes` are handed to the feature extractor
/// and not persisted.
#[derive(Clone, Debug, Default)]
pub struct NewImage {
    /// Original file name.
    pub filename: String,
    /// Storage path of the original file.
    pub original_path: String,
    /// Storage path of the thumbnail.
    pub thumbnail_path: String,
    /// Encoded image content.
    pub bytes: Vec<u8>,
}

impl NewImage {
    /// Creates an upload whose thumbnail path is derived from the original.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        Self {
            original_path: format!("uploads/{}", filename),
            thumbnail_path: format!("thumbnails/{}", filename),
            filename,
            bytes,
        }
    }
}

/// Output of a feature extractor for one image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractedFeatures {
    /// Feature vector of the database dimension.
    pub embedding: Embedding,
    /// Descriptive tags.
    pub tags: Vec<String>,
    /// Short description.
    pub description: String,
    /// Dominant colors, most prevalent first.
    pub colors: Vec<Rgb>,
}
