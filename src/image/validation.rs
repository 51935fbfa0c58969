//! Input validation for images.
//!
//! # Validation Layers
//!
//! ```text
//! GalleryDB::upload()
//!     ├── validate_new_image()       ← caller-supplied fields
//!     └── IngestionPipeline
//!             ├── normalize_features()   ← extractor output
//!             └── store.put()
//!                     └── validate_record()   ← every write
//! ```

use crate::color::Rgb;
use crate::error::ValidationError;
use crate::image::types::{ExtractedFeatures, ImageRecord, NewImage};
use crate::storage::schema::{
    MAX_DESCRIPTION_SIZE, MAX_FILENAME_LENGTH, MAX_PATH_LENGTH, MAX_TAGS, MAX_TAG_LENGTH,
    MAX_UPLOAD_SIZE,
};

/// Validates an upload before a record is allocated.
///
/// # Rules
///
/// | Field | Constraint |
/// |-------|------------|
/// | `filename` | Non-empty, max 255 chars |
/// | `original_path`, `thumbnail_path` | Non-empty, max 1024 chars |
/// | `bytes` | Max 50 MB |
pub(crate) fn validate_new_image(image: &NewImage) -> Result<(), ValidationError> {
    validate_filename(&image.filename)?;
    validate_path("original_path", &image.original_path)?;
    validate_path("thumbnail_path", &image.thumbnail_path)?;

    if image.bytes.len() > MAX_UPLOAD_SIZE {
        return Err(ValidationError::content_too_large(
            image.bytes.len(),
            MAX_UPLOAD_SIZE,
        ));
    }

    Ok(())
}

/// Validates a record before it is written to the store.
///
/// Enforces the status/feature-vector invariant: a vector of `dimension`
/// finite values is present iff the record is completed.
pub(crate) fn validate_record(
    record: &ImageRecord,
    dimension: usize,
    max_colors: usize,
) -> Result<(), ValidationError> {
    validate_filename(&record.filename)?;
    validate_path("original_path", &record.original_path)?;
    validate_path("thumbnail_path", &record.thumbnail_path)?;

    if record.description.len() > MAX_DESCRIPTION_SIZE {
        return Err(ValidationError::content_too_large(
            record.description.len(),
            MAX_DESCRIPTION_SIZE,
        ));
    }

    validate_tags(record.tags.iter().map(String::as_str), record.tags.len())?;

    if record.colors.len() > max_colors {
        return Err(ValidationError::too_many_items(
            "colors",
            record.colors.len(),
            max_colors,
        ));
    }

    match (&record.embedding, record.status.is_completed()) {
        (Some(embedding), true) => validate_embedding(embedding, dimension),
        (None, false) => Ok(()),
        (None, true) => Err(ValidationError::required_field(
            "embedding (required for completed images)",
        )),
        (Some(_), false) => Err(ValidationError::invalid_field(
            "embedding",
            "only completed images carry a feature vector",
        )),
    }
}

/// Checks dimension and finiteness of a feature vector.
pub(crate) fn validate_embedding(embedding: &[f32], dimension: usize) -> Result<(), ValidationError> {
    if embedding.len() != dimension {
        return Err(ValidationError::dimension_mismatch(
            dimension,
            embedding.len(),
        ));
    }
    if let Some(i) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(ValidationError::invalid_field(
            "embedding",
            format!("value at index {} is not finite", i),
        ));
    }
    Ok(())
}

/// Cleans extractor output before it is committed.
///
/// Tags are trimmed, empties dropped and duplicates removed (first
/// occurrence wins); colors beyond `max_colors` are dropped. Returns the
/// number of truncated colors alongside the cleaned features.
pub(crate) fn normalize_features(
    mut features: ExtractedFeatures,
    dimension: usize,
    max_colors: usize,
) -> Result<(ExtractedFeatures, usize), ValidationError> {
    validate_embedding(&features.embedding, dimension)?;

    let mut seen = std::collections::HashSet::new();
    features.tags = features
        .tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect();
    validate_tags(features.tags.iter().map(String::as_str), features.tags.len())?;

    features.description = features.description.trim().to_string();
    if features.description.len() > MAX_DESCRIPTION_SIZE {
        return Err(ValidationError::content_too_large(
            features.description.len(),
            MAX_DESCRIPTION_SIZE,
        ));
    }

    features.colors = dedup_colors(features.colors);
    let truncated = features.colors.len().saturating_sub(max_colors);
    features.colors.truncate(max_colors);

    Ok((features, truncated))
}

fn dedup_colors(colors: Vec<Rgb>) -> Vec<Rgb> {
    let mut out: Vec<Rgb> = Vec::with_capacity(colors.len());
    for c in colors {
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

fn validate_filename(filename: &str) -> Result<(), ValidationError> {
    if filename.trim().is_empty() {
        return Err(ValidationError::required_field("filename"));
    }
    if filename.chars().count() > MAX_FILENAME_LENGTH {
        return Err(ValidationError::invalid_field(
            "filename",
            format!("exceeds max length of {} chars", MAX_FILENAME_LENGTH),
        ));
    }
    Ok(())
}

fn validate_path(field: &str, path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::required_field(field));
    }
    if path.len() > MAX_PATH_LENGTH {
        return Err(ValidationError::invalid_field(
            field,
            format!("exceeds max length of {} chars", MAX_PATH_LENGTH),
        ));
    }
    Ok(())
}

fn validate_tags<'a>(tags: impl Iterator<Item = &'a str>, count: usize) -> Result<(), ValidationError> {
    if count > MAX_TAGS {
        return Err(ValidationError::too_many_items("tags", count, MAX_TAGS));
    }
    for (i, tag) in tags.enumerate() {
        if tag.len() > MAX_TAG_LENGTH {
            return Err(ValidationError::invalid_field(
                "tags",
                format!(
                    "tag at index {} exceeds max length of {} chars (got {})",
                    i,
                    MAX_TAG_LENGTH,
                    tag.len()
                ),
            ));
        }
    }
    Ok(())
}
