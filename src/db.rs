//! GalleryDB main struct and lifecycle operations.
//!
//! The [`GalleryDB`] struct is the primary interface for interacting with
//! the database. It provides methods for:
//!
//! - Opening and closing the database
//! - Uploading images and tracking their processing status
//! - Listing and text search
//! - Similar-image and color-filter search
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use gallerydb::{Caller, Config, ExtractedFeatures, GalleryDB, IngestionConfig, NewImage, Rgb};
//!
//! # fn main() -> gallerydb::Result<()> {
//! # let dir = tempfile::tempdir().unwrap();
//! # let path = dir.path().join("gallery.db");
//! let extractor = |bytes: &[u8]| -> gallerydb::Result<ExtractedFeatures> {
//!     Ok(ExtractedFeatures {
//!         embedding: vec![bytes.len() as f32, 1.0],
//!         colors: vec![Rgb::new(250, 10, 10)],
//!         ..Default::default()
//!     })
//! };
//! let config = Config {
//!     dimension: 2,
//!     ingestion: IngestionConfig::inline(),
//!     ..Default::default()
//! };
//! let db = GalleryDB::open_with_extractor(&path, config, Arc::new(extractor))?;
//!
//! let caller = Caller::new("alice");
//! db.upload(Some(&caller), vec![NewImage::new("sunset.jpg", vec![0; 16])])?;
//!
//! let reds = db.filter_by_color(Some(&caller), "#FF0000", 10)?;
//! assert_eq!(reds.len(), 1);
//!
//! db.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! `GalleryDB` is `Send + Sync` and can be shared across threads using `Arc`.
//! The underlying storage uses MVCC for concurrent reads with exclusive
//! write locking; each index guards its state with a reader-writer lock.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::auth::{authorize, Caller};
use crate::config::Config;
use crate::error::{GalleryDBError, Result, ValidationError};
use crate::image::validation::validate_new_image;
use crate::image::{ImageRecord, NewImage, ProcessingStatus};
use crate::indexes::{Indexes, RebuildReport};
use crate::ingest::{FeatureExtractor, IngestionPipeline, IngestionWorkers, UnavailableExtractor};
use crate::search::{ScoredImage, SearchPage, SearchService};
use crate::storage::schema::MAX_UPLOAD_BATCH;
use crate::storage::{DatabaseMetadata, FeatureStore, RedbStorage};
use crate::types::ImageId;
use crate::vector::IndexKind;

/// Error recorded on images whose extraction was cut short by a shutdown.
pub const INTERRUPTED_ERROR: &str = "ingestion interrupted";

/// Snapshot of database and index sizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GalleryStats {
    /// Stored records, in any status.
    pub images: u64,
    /// Records awaiting extraction.
    pub pending: u64,
    /// Records with features.
    pub completed: u64,
    /// Records whose extraction failed.
    pub failed: u64,
    /// Entries in the vector index.
    pub indexed_vectors: usize,
    /// Images registered in the color index.
    pub indexed_colors: usize,
    /// Occupied color buckets.
    pub color_buckets: usize,
    /// Active vector index implementation.
    pub index_kind: IndexKind,
    /// Feature vector dimension.
    pub dimension: usize,
}

/// The main GalleryDB database handle.
///
/// Create an instance with [`GalleryDB::open()`] (or
/// [`GalleryDB::open_with_extractor()`]) and close it with
/// [`GalleryDB::close()`].
///
/// Every query and mutation takes the verified caller as
/// `Option<&Caller>`; `None` fails with [`GalleryDBError::Unauthorized`].
pub struct GalleryDB {
    storage: Arc<RedbStorage>,
    indexes: Arc<Indexes>,
    pipeline: Arc<IngestionPipeline>,
    /// `None` when ingestion runs inline.
    workers: Option<IngestionWorkers>,
    search: SearchService,
    config: Config,
}

impl std::fmt::Debug for GalleryDB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GalleryDB")
            .field("config", &self.config)
            .field("dimension", &self.dimension())
            .finish_non_exhaustive()
    }
}

impl GalleryDB {
    /// Opens or creates a GalleryDB database with no feature extractor.
    ///
    /// Uploads are stored and listable but every extraction fails. Use
    /// [`GalleryDB::open_with_extractor()`] to make images searchable.
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        Self::open_with_extractor(path, config, Arc::new(UnavailableExtractor))
    }

    /// Opens or creates a GalleryDB database at the specified path.
    ///
    /// On open, records left `pending` by a previous process are marked
    /// failed and both indexes are rebuilt from the stored features.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration is invalid (`Config { reason }`, see [`Config::validate`])
    /// - Database file is corrupted
    /// - Database is locked by another process
    /// - Schema version doesn't match
    /// - Feature vector dimension doesn't match the existing database
    #[instrument(skip(config, extractor), fields(path = %path.as_ref().display()))]
    pub fn open_with_extractor(
        path: impl AsRef<Path>,
        config: Config,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| GalleryDBError::config(e.to_string()))?;

        info!("Opening GalleryDB");

        let storage = Arc::new(RedbStorage::open(&path, &config)?);
        let store: Arc<dyn FeatureStore> = storage.clone();

        let interrupted = fail_interrupted(store.as_ref())?;
        if interrupted > 0 {
            warn!(count = interrupted, "Marked interrupted ingestions as failed");
        }

        let indexes = Arc::new(Indexes::new(&config));
        let report = indexes.rebuild_from(store.as_ref())?;

        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&store),
            Arc::clone(&indexes),
            extractor,
            &config,
        ));
        let workers = if config.ingestion.is_inline() {
            None
        } else {
            Some(IngestionWorkers::start(
                Arc::clone(&pipeline),
                &config.ingestion,
            )?)
        };
        let search = SearchService::new(store, Arc::clone(&indexes), &config);

        info!(
            dimension = config.dimension,
            sync_mode = ?config.sync_mode,
            indexed = report.vectors,
            index_kind = ?report.kind,
            "GalleryDB opened successfully"
        );

        Ok(Self {
            storage,
            indexes,
            pipeline,
            workers,
            search,
            config,
        })
    }

    /// Closes the database.
    ///
    /// Queued uploads are processed before the worker threads exit. This
    /// method consumes the `GalleryDB` instance.
    #[instrument(skip(self))]
    pub fn close(self) -> Result<()> {
        info!("Closing GalleryDB");

        let Self {
            storage,
            indexes,
            pipeline,
            workers,
            search,
            config: _,
        } = self;

        if let Some(mut workers) = workers {
            workers.shutdown();
        }
        drop(search);
        drop(pipeline);
        drop(indexes);

        match Arc::try_unwrap(storage) {
            Ok(storage) => storage.close()?,
            Err(_) => warn!("Storage still shared at close; it closes on last drop"),
        }

        info!("GalleryDB closed successfully");
        Ok(())
    }

    /// Returns the configuration used to open this database.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the database metadata.
    #[inline]
    pub fn metadata(&self) -> &DatabaseMetadata {
        self.storage.metadata()
    }

    /// Returns the feature vector dimension D.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.storage.dimension()
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Uploads a batch of images.
    ///
    /// Each image is stored as `pending` and queued for feature extraction.
    /// Returns the pending snapshots in input order; poll
    /// [`GalleryDB::get_image()`] (or call [`GalleryDB::wait_for_ingestion()`])
    /// to observe the final status. With inline ingestion, extraction has
    /// already finished when this returns.
    ///
    /// Extraction failures never fail the upload; they are recorded on the
    /// image as `Failed { error }`.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` without a caller
    /// - `ValidationError` for an empty batch, more than
    ///   `MAX_UPLOAD_BATCH` images, or an invalid upload (checked for the
    ///   whole batch before anything is stored)
    #[instrument(skip(self, caller, images), fields(count = images.len()))]
    pub fn upload(&self, caller: Option<&Caller>, images: Vec<NewImage>) -> Result<Vec<ImageRecord>> {
        let uploader = authorize(caller)?;

        if images.is_empty() {
            return Err(ValidationError::required_field("images").into());
        }
        if images.len() > MAX_UPLOAD_BATCH {
            return Err(
                ValidationError::too_many_items("images", images.len(), MAX_UPLOAD_BATCH).into(),
            );
        }
        for image in &images {
            validate_new_image(image)?;
        }

        let mut pending = Vec::with_capacity(images.len());
        for image in images {
            let record = self.pipeline.submit_pending(&image, uploader)?;
            let handed_off = match &self.workers {
                Some(workers) => workers.submit(record.id, image.bytes),
                None => self.pipeline.process(record.id, &image.bytes).map(|_| ()),
            };
            if let Err(e) = handed_off {
                // Don't leave a pending row the caller never learns about
                self.pipeline.abandon(record.id, &e.to_string())?;
                return Err(e);
            }
            pending.push(record);
        }

        info!(count = pending.len(), uploader = %uploader, "Images uploaded");
        Ok(pending)
    }

    /// Blocks until every queued upload has reached a terminal status.
    ///
    /// Returns immediately with inline ingestion.
    pub fn wait_for_ingestion(&self) {
        if let Some(workers) = &self.workers {
            workers.wait_idle();
        }
    }

    /// Returns one image record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the image doesn't exist.
    pub fn get_image(&self, caller: Option<&Caller>, id: ImageId) -> Result<ImageRecord> {
        authorize(caller)?;
        self.storage.get(id)
    }

    /// Deletes an image from the store and both indexes.
    ///
    /// Returns whether the image existed. An extraction still running for
    /// the image is discarded when it finishes.
    #[instrument(skip(self, caller))]
    pub fn delete_image(&self, caller: Option<&Caller>, id: ImageId) -> Result<bool> {
        authorize(caller)?;
        let existed = self.pipeline.delete(id)?;
        info!(existed, "Image deleted");
        Ok(existed)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Lists images newest-first. Pages are 1-based.
    pub fn get_images(
        &self,
        caller: Option<&Caller>,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<ImageRecord>> {
        authorize(caller)?;
        self.search.get_images(page, page_size)
    }

    /// Case-insensitive text search over filename, description and tags.
    ///
    /// Every whitespace-separated token must match; an empty query matches
    /// every image.
    pub fn search_by_text(
        &self,
        caller: Option<&Caller>,
        query: &str,
        page: usize,
        page_size: usize,
    ) -> Result<SearchPage> {
        authorize(caller)?;
        self.search.search_by_text(query, page, page_size)
    }

    /// Returns up to `limit` completed images most similar to `id`,
    /// excluding `id` itself, closest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `id` doesn't exist. An image that isn't
    /// completed yields an empty list.
    pub fn find_similar(
        &self,
        caller: Option<&Caller>,
        id: ImageId,
        limit: usize,
    ) -> Result<Vec<ScoredImage>> {
        authorize(caller)?;
        self.search.find_similar(id, limit)
    }

    /// Returns up to `limit` completed images with a dominant color closest
    /// to `color` (`#RRGGBB`, `#RGB` or `rgb(r, g, b)`).
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidColor` for a malformed color.
    pub fn filter_by_color(
        &self,
        caller: Option<&Caller>,
        color: &str,
        limit: usize,
    ) -> Result<Vec<ScoredImage>> {
        authorize(caller)?;
        self.search.filter_by_color(color, limit)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rebuilds both indexes from the feature store.
    ///
    /// Queries keep being answered from the previous indexes until the new
    /// ones are swapped in.
    #[instrument(skip(self, caller))]
    pub fn rebuild_indexes(&self, caller: Option<&Caller>) -> Result<RebuildReport> {
        authorize(caller)?;
        self.indexes.rebuild_from(self.storage.as_ref())
    }

    /// Returns record counts by status and index sizes.
    pub fn stats(&self, caller: Option<&Caller>) -> Result<GalleryStats> {
        authorize(caller)?;

        let mut stats = GalleryStats {
            images: 0,
            pending: 0,
            completed: 0,
            failed: 0,
            indexed_vectors: 0,
            indexed_colors: self.indexes.colors().len(),
            color_buckets: self.indexes.colors().bucket_count(),
            index_kind: IndexKind::Exact,
            dimension: self.dimension(),
        };
        for record in self.storage.list_all_metadata()? {
            stats.images += 1;
            match record.status {
                ProcessingStatus::Pending => stats.pending += 1,
                ProcessingStatus::Completed => stats.completed += 1,
                ProcessingStatus::Failed { .. } => stats.failed += 1,
            }
        }
        let vectors = self.indexes.vectors()?;
        stats.indexed_vectors = vectors.len();
        stats.index_kind = vectors.kind();

        Ok(stats)
    }
}

/// Fails records left `pending` by a previous process.
///
/// Their bytes were never persisted, so extraction cannot resume.
fn fail_interrupted(store: &dyn FeatureStore) -> Result<usize> {
    let mut count = 0;
    for record in store.list_all_metadata()? {
        if record.status.is_pending() {
            store.put(&record.failed(INTERRUPTED_ERROR))?;
            count += 1;
        }
    }
    Ok(count)
}
