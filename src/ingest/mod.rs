//! Image ingestion: feature extraction and the pending → completed/failed
//! lifecycle.
//!
//! # Providers
//!
//! - [`UnavailableExtractor`] - Default; fails every extraction so uploads
//!   end up `failed` until a real extractor is configured
//! - Any `Fn(&[u8]) -> Result<ExtractedFeatures>` closure
//!
//! # Example
//!
//! ```rust
//! use gallerydb::ingest::FeatureExtractor;
//! use gallerydb::{ExtractedFeatures, Rgb};
//!
//! let extractor = |bytes: &[u8]| -> gallerydb::Result<ExtractedFeatures> {
//!     Ok(ExtractedFeatures {
//!         embedding: vec![bytes.len() as f32, 1.0],
//!         tags: vec!["photo".into()],
//!         description: "A photo".into(),
//!         colors: vec![Rgb::new(200, 30, 30)],
//!     })
//! };
//! let features = extractor.extract(b"abc").unwrap();
//! assert_eq!(features.embedding, vec![3.0, 1.0]);
//! ```

mod pipeline;
mod worker;

pub(crate) use pipeline::{panic_message, IngestionPipeline, ProcessingOutcome};
pub(crate) use worker::IngestionWorkers;

use crate::error::{GalleryDBError, Result};
use crate::image::ExtractedFeatures;

/// Feature extractor contract.
///
/// Turns encoded image bytes into a feature vector plus descriptive
/// metadata. Implementations must be thread-safe (`Send + Sync`); the
/// worker pool calls them concurrently.
///
/// # Implementing a Custom Extractor
///
/// ```rust,ignore
/// use gallerydb::ingest::FeatureExtractor;
/// use gallerydb::{ExtractedFeatures, Result};
///
/// struct ClipExtractor {
///     model: MyClipModel,
/// }
///
/// impl FeatureExtractor for ClipExtractor {
///     fn extract(&self, bytes: &[u8]) -> Result<ExtractedFeatures> {
///         let image = decode(bytes)?;
///         Ok(ExtractedFeatures {
///             embedding: self.model.embed(&image)?,
///             tags: self.model.labels(&image)?,
///             description: self.model.caption(&image)?,
///             colors: dominant_colors(&image, 5),
///         })
///     }
/// }
/// ```
pub trait FeatureExtractor: Send + Sync {
    /// Extracts features from one encoded image.
    ///
    /// # Errors
    ///
    /// Any error marks the image `failed` with the error's message; it is
    /// never returned to the uploader.
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedFeatures>;
}

impl<F> FeatureExtractor for F
where
    F: Fn(&[u8]) -> Result<ExtractedFeatures> + Send + Sync,
{
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedFeatures> {
        self(bytes)
    }
}

/// Extractor used when none is configured.
///
/// Every extraction fails, so uploads are stored and listable but never
/// become searchable by similarity or color.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableExtractor;

impl FeatureExtractor for UnavailableExtractor {
    fn extract(&self, _bytes: &[u8]) -> Result<ExtractedFeatures> {
        Err(GalleryDBError::extraction(
            "No feature extractor configured",
        ))
    }
}
