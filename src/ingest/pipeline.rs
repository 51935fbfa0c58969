//! The per-image ingestion state machine.
//!
//! ```text
//! submit_pending()           process()
//!   validate upload            extract features (no locks held)
//!   allocate id                ── lock(id) ──────────────────────────
//!   put Pending                re-read record
//!                              gone or not Pending? → Cancelled
//!                              ok  → put Completed → index insert
//!                              err → put Failed
//!                              ── unlock ────────────────────────────
//! ```
//!
//! Deletion takes the same per-id lock, so a delete either happens before
//! the re-read (and the result is dropped) or after the index insert (and
//! removes it again). Identifiers are never reused, so a deleted record
//! can't be resurrected by a late extraction.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{GalleryDBError, Result};
use crate::image::validation::{normalize_features, validate_new_image};
use crate::image::{ImageRecord, NewImage};
use crate::indexes::Indexes;
use crate::storage::FeatureStore;
use crate::types::{ImageId, Timestamp, UserId};

use super::FeatureExtractor;

/// Number of lock stripes for per-image serialization.
const LOCK_STRIPES: usize = 64;

/// Striped per-identifier mutexes.
///
/// Writes to the same image serialize; writes to different images only
/// contend when they hash to the same stripe.
struct IdLocks {
    stripes: Vec<Mutex<()>>,
}

impl IdLocks {
    fn new() -> Self {
        Self {
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn lock(&self, id: ImageId) -> MutexGuard<'_, ()> {
        let stripe = &self.stripes[(id.as_u64() % LOCK_STRIPES as u64) as usize];
        // The guarded value is (), so a poisoned stripe holds no broken state
        stripe.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// How a single ingestion ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ProcessingOutcome {
    /// Record committed as completed and indexed.
    Completed,
    /// Record committed as failed.
    Failed(String),
    /// Record was deleted (or already processed) before commit.
    Cancelled,
}

pub(crate) struct IngestionPipeline {
    store: Arc<dyn FeatureStore>,
    indexes: Arc<Indexes>,
    extractor: Arc<dyn FeatureExtractor>,
    locks: IdLocks,
    dimension: usize,
    max_colors: usize,
}

impl IngestionPipeline {
    pub(crate) fn new(
        store: Arc<dyn FeatureStore>,
        indexes: Arc<Indexes>,
        extractor: Arc<dyn FeatureExtractor>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            indexes,
            extractor,
            locks: IdLocks::new(),
            dimension: config.dimension,
            max_colors: config.color.max_colors,
        }
    }

    /// Validates an upload and persists it as `Pending`.
    pub(crate) fn submit_pending(&self, image: &NewImage, uploader: &UserId) -> Result<ImageRecord> {
        validate_new_image(image)?;

        let id = self.store.next_id()?;
        let record = ImageRecord::pending(id, image, uploader.clone(), Timestamp::now());
        self.store.put(&record)?;

        debug!(id = %id, filename = %record.filename, "Image stored as pending");
        Ok(record)
    }

    /// Runs extraction for a pending image and commits the outcome.
    ///
    /// A panicking extractor counts as a failed extraction.
    pub(crate) fn process(&self, id: ImageId, bytes: &[u8]) -> Result<ProcessingOutcome> {
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| self.extractor.extract(bytes)))
            .unwrap_or_else(|payload| {
                Err(GalleryDBError::extraction(format!(
                    "extractor panicked: {}",
                    panic_message(payload.as_ref())
                )))
            })
            .and_then(|features| {
                normalize_features(features, self.dimension, self.max_colors).map_err(Into::into)
            });

        let outcome = {
            let _guard = self.locks.lock(id);

            let current = match self.store.find(id)? {
                Some(record) if record.status.is_pending() => record,
                Some(_) | None => {
                    warn!(id = %id, "Image deleted or no longer pending; dropping extraction result");
                    return Ok(ProcessingOutcome::Cancelled);
                }
            };

            match extracted {
                Ok((features, truncated)) => {
                    if truncated > 0 {
                        warn!(id = %id, truncated, "Dropped dominant colors beyond the limit");
                    }
                    let done = current.completed(features);
                    match self.store.put(&done) {
                        Ok(()) => {
                            let embedding = done.embedding.as_deref().unwrap_or_default();
                            self.indexes.insert(id, embedding, &done.colors)?;
                            debug!(id = %id, "Image completed");
                            ProcessingOutcome::Completed
                        }
                        Err(e) if e.is_validation() => self.mark_failed(&current, e.to_string())?,
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => self.mark_failed(&current, e.to_string())?,
            }
        };

        if outcome == ProcessingOutcome::Completed {
            self.indexes.maybe_promote(self.store.as_ref())?;
        }
        Ok(outcome)
    }

    fn mark_failed(&self, current: &ImageRecord, error: String) -> Result<ProcessingOutcome> {
        warn!(id = %current.id, error = %error, "Feature extraction failed");
        self.store.put(&current.failed(error.clone()))?;
        Ok(ProcessingOutcome::Failed(error))
    }

    /// Marks an image failed if it is still pending.
    ///
    /// For jobs that could not be queued or did not run to completion.
    pub(crate) fn abandon(&self, id: ImageId, error: &str) -> Result<()> {
        let _guard = self.locks.lock(id);
        if let Some(record) = self.store.find(id)? {
            if record.status.is_pending() {
                self.mark_failed(&record, error.to_string())?;
            }
        }
        Ok(())
    }

    /// Deletes an image from the store and both indexes.
    ///
    /// Returns whether the record existed.
    pub(crate) fn delete(&self, id: ImageId) -> Result<bool> {
        let _guard = self.locks.lock(id);
        let existed = self.store.delete(id)?;
        self.indexes.remove(id)?;
        Ok(existed)
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::image::ExtractedFeatures;
    use crate::ingest::UnavailableExtractor;
    use crate::storage::RedbStorage;
    use tempfile::{tempdir, TempDir};

    const DIM: usize = 3;

    type Fixture = (
        TempDir,
        IngestionPipeline,
        Arc<dyn FeatureStore>,
        Arc<Indexes>,
    );

    fn setup(extractor: Arc<dyn FeatureExtractor>) -> Fixture {
        let dir = tempdir().unwrap();
        let config = Config::with_dimension(DIM);
        let store: Arc<dyn FeatureStore> =
            Arc::new(RedbStorage::open(dir.path().join("t.db"), &config).unwrap());
        let indexes = Arc::new(Indexes::new(&config));
        let pipeline =
            IngestionPipeline::new(Arc::clone(&store), Arc::clone(&indexes), extractor, &config);
        (dir, pipeline, store, indexes)
    }

    fn working_extractor() -> Arc<dyn FeatureExtractor> {
        Arc::new(|bytes: &[u8]| -> Result<ExtractedFeatures> {
            Ok(ExtractedFeatures {
                embedding: vec![bytes.len() as f32, 1.0, 0.0],
                tags: vec![" beach ".into(), "sea".into(), "beach".into()],
                description: "Sunny beach".into(),
                colors: vec![Rgb::new(0, 128, 255)],
            })
        })
    }

    fn uploader() -> UserId {
        UserId::new("alice")
    }

    #[test]
    fn test_successful_ingestion() {
        let (_dir, pipeline, store, indexes) = setup(working_extractor());
        let pending = pipeline
            .submit_pending(&NewImage::new("beach.jpg", vec![1, 2]), &uploader())
            .unwrap();
        assert!(pending.status.is_pending());

        let outcome = pipeline.process(pending.id, &[1, 2]).unwrap();
        assert_eq!(outcome, ProcessingOutcome::Completed);

        let stored = store.get(pending.id).unwrap();
        assert!(stored.is_completed());
        assert_eq!(stored.description, "Sunny beach");
        assert_eq!(stored.tags.len(), 2);
        assert_eq!(stored.uploaded_by, uploader());
        assert!(indexes.vectors().unwrap().contains(pending.id));
        assert!(indexes.colors().contains(pending.id));
    }

    #[test]
    fn test_failed_extraction_leaves_indexes_untouched() {
        let (_dir, pipeline, store, indexes) = setup(Arc::new(UnavailableExtractor));
        let pending = pipeline
            .submit_pending(&NewImage::new("x.jpg", vec![]), &uploader())
            .unwrap();

        let outcome = pipeline.process(pending.id, &[]).unwrap();
        assert!(matches!(outcome, ProcessingOutcome::Failed(_)));

        let stored = store.get(pending.id).unwrap();
        assert!(stored.status.error().unwrap().contains("No feature extractor"));
        assert!(indexes.vectors().unwrap().is_empty());
        assert!(indexes.colors().is_empty());
    }

    #[test]
    fn test_wrong_dimension_output_fails_record() {
        let extractor: Arc<dyn FeatureExtractor> =
            Arc::new(|_: &[u8]| -> Result<ExtractedFeatures> {
                Ok(ExtractedFeatures {
                    embedding: vec![1.0; DIM + 2],
                    ..Default::default()
                })
            });
        let (_dir, pipeline, store, _indexes) = setup(extractor);
        let pending = pipeline
            .submit_pending(&NewImage::new("x.jpg", vec![]), &uploader())
            .unwrap();

        let outcome = pipeline.process(pending.id, &[]).unwrap();
        assert!(matches!(outcome, ProcessingOutcome::Failed(ref e) if e.contains("dimension")));
        assert!(store.get(pending.id).unwrap().status.is_failed());
    }

    #[test]
    fn test_deleted_before_commit_is_not_resurrected() {
        let (_dir, pipeline, store, indexes) = setup(working_extractor());
        let pending = pipeline
            .submit_pending(&NewImage::new("x.jpg", vec![]), &uploader())
            .unwrap();

        assert!(pipeline.delete(pending.id).unwrap());
        let outcome = pipeline.process(pending.id, &[]).unwrap();

        assert_eq!(outcome, ProcessingOutcome::Cancelled);
        assert!(store.find(pending.id).unwrap().is_none());
        assert!(!indexes.vectors().unwrap().contains(pending.id));
    }

    #[test]
    fn test_no_retry_after_failure() {
        let (_dir, pipeline, store, _indexes) = setup(Arc::new(UnavailableExtractor));
        let pending = pipeline
            .submit_pending(&NewImage::new("x.jpg", vec![]), &uploader())
            .unwrap();
        pipeline.process(pending.id, &[]).unwrap();

        // A second run finds a non-pending record and does nothing
        let outcome = pipeline.process(pending.id, &[]).unwrap();
        assert_eq!(outcome, ProcessingOutcome::Cancelled);
        assert!(store.get(pending.id).unwrap().status.is_failed());
    }

    #[test]
    fn test_invalid_upload_rejected_before_storage() {
        let (_dir, pipeline, store, _indexes) = setup(working_extractor());
        let err = pipeline
            .submit_pending(&NewImage::new("", vec![]), &uploader())
            .unwrap_err();
        assert!(matches!(err, GalleryDBError::Validation(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_panicking_extractor_fails_record() {
        let extractor: Arc<dyn FeatureExtractor> =
            Arc::new(|_: &[u8]| -> Result<ExtractedFeatures> { panic!("decoder blew up") });
        let (_dir, pipeline, store, indexes) = setup(extractor);
        let pending = pipeline
            .submit_pending(&NewImage::new("x.jpg", vec![1]), &uploader())
            .unwrap();

        let outcome = pipeline.process(pending.id, &[1]).unwrap();
        assert!(matches!(outcome, ProcessingOutcome::Failed(ref e) if e.contains("decoder blew up")));
        assert!(store.get(pending.id).unwrap().status.is_failed());
        assert!(indexes.vectors().unwrap().is_empty());
    }

    #[test]
    fn test_abandon_only_touches_pending() {
        let (_dir, pipeline, store, _indexes) = setup(working_extractor());
        let stuck = pipeline
            .submit_pending(&NewImage::new("a.jpg", vec![1]), &uploader())
            .unwrap();
        let done = pipeline
            .submit_pending(&NewImage::new("b.jpg", vec![1]), &uploader())
            .unwrap();
        pipeline.process(done.id, &[1]).unwrap();

        pipeline.abandon(stuck.id, "queue closed").unwrap();
        pipeline.abandon(done.id, "queue closed").unwrap();
        pipeline.abandon(ImageId::new(999), "queue closed").unwrap();

        assert_eq!(store.get(stuck.id).unwrap().status.error(), Some("queue closed"));
        assert!(store.get(done.id).unwrap().is_completed());
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let (_dir, pipeline, _store, _indexes) = setup(working_extractor());
        assert!(!pipeline.delete(ImageId::new(42)).unwrap());
    }

    #[test]
    fn test_striped_locks_same_id_same_stripe() {
        let locks = IdLocks::new();
        let id = ImageId::new(7);
        drop(locks.lock(id));
        let _a = locks.lock(id);
        // A different stripe is still available
        let _b = locks.lock(ImageId::new(8));
    }
}
