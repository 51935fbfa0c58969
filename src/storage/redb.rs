//! redb storage engine implementation.
//!
//! This module provides the feature store backend for GalleryDB using
//! [redb](https://docs.rs/redb), a pure Rust embedded key-value store.
//!
//! # Features
//!
//! - ACID transactions with MVCC
//! - Single-writer, multiple-reader concurrency
//! - Automatic crash recovery
//! - Zero external dependencies (pure Rust)

use std::path::{Path, PathBuf};

use ::redb::{
    Database, Durability, ReadableTable, ReadableTableMetadata, ReadOnlyTable, WriteTransaction,
};
use tracing::{debug, info, instrument, warn};

use super::schema::{
    decode_embedding, decode_time_key, encode_embedding, encode_time_key, DatabaseMetadata,
    EMBEDDINGS_TABLE, IMAGES_BY_TIME_TABLE, IMAGES_TABLE, METADATA_KEY, METADATA_TABLE,
    NEXT_ID_KEY, SCHEMA_VERSION,
};
use super::{FeatureStore, StoredFeatures};
use crate::config::{Config, SyncMode};
use crate::error::{GalleryDBError, Result, StorageError, ValidationError};
use crate::image::validation::validate_record;
use crate::image::ImageRecord;
use crate::types::ImageId;

/// redb storage engine wrapper.
///
/// This struct holds the redb database handle and cached metadata.
/// It implements [`FeatureStore`] for use with GalleryDB.
///
/// # Thread Safety
///
/// `RedbStorage` is `Send + Sync`. redb handles internal synchronization
/// using MVCC for readers and exclusive locking for writers.
#[derive(Debug)]
pub struct RedbStorage {
    /// The redb database handle.
    db: Database,

    /// Cached database metadata.
    metadata: DatabaseMetadata,

    /// Path to the database file.
    path: PathBuf,

    sync_mode: SyncMode,

    max_colors: usize,
}

impl RedbStorage {
    /// Opens or creates a database at the given path.
    ///
    /// If the database doesn't exist, it will be created and initialized
    /// with the configuration settings. If it exists, the configuration
    /// will be validated against the stored metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The database file is corrupted
    /// - The database is locked by another process
    /// - Schema version doesn't match
    /// - Feature vector dimension doesn't match (for existing databases)
    #[instrument(skip(config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let db_exists = path.exists();

        debug!(db_exists = db_exists, "Opening storage engine");

        let db = Self::create_database(path)?;

        if db_exists {
            Self::open_existing(db, path.to_path_buf(), config)
        } else {
            Self::initialize_new(db, path.to_path_buf(), config)
        }
    }

    fn create_database(path: &Path) -> Result<Database> {
        // redb 2.x manages its page cache internally; cache_size_mb is
        // validated but not forwarded.
        //
        // redb doesn't expose a typed error variant for lock conflicts,
        // so they are detected via the error message.
        let db = Database::builder().create(path).map_err(|e| {
            if e.to_string().contains("locked") {
                StorageError::DatabaseLocked
            } else {
                StorageError::Redb(e.to_string())
            }
        })?;

        debug!("Database file opened successfully");
        Ok(db)
    }

    #[instrument(skip(db, config), fields(path = %path.display()))]
    fn initialize_new(db: Database, path: PathBuf, config: &Config) -> Result<Self> {
        info!("Initializing new database");

        let metadata = DatabaseMetadata::new(config.dimension);

        // Create all tables and write metadata in a single transaction
        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let metadata_bytes = bincode::serialize(&metadata)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            meta_table.insert(METADATA_KEY, metadata_bytes.as_slice())?;
            meta_table.insert(NEXT_ID_KEY, 1u64.to_le_bytes().as_slice())?;

            let _ = write_txn.open_table(IMAGES_TABLE)?;
            let _ = write_txn.open_table(EMBEDDINGS_TABLE)?;
            let _ = write_txn.open_table(IMAGES_BY_TIME_TABLE)?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(
            schema_version = SCHEMA_VERSION,
            dimension = config.dimension,
            "Database initialized"
        );

        Ok(Self::from_parts(db, metadata, path, config))
    }

    #[instrument(skip(db, config), fields(path = %path.display()))]
    fn open_existing(db: Database, path: PathBuf, config: &Config) -> Result<Self> {
        info!("Opening existing database");

        let read_txn = db.begin_read().map_err(StorageError::from)?;
        let metadata = {
            let meta_table = read_txn.open_table(METADATA_TABLE).map_err(|e| {
                StorageError::corrupted(format!("Cannot open metadata table: {}", e))
            })?;

            let metadata_bytes = meta_table
                .get(METADATA_KEY)
                .map_err(StorageError::from)?
                .ok_or_else(|| StorageError::corrupted("Missing database metadata"))?;

            bincode::deserialize::<DatabaseMetadata>(metadata_bytes.value())
                .map_err(|e| StorageError::corrupted(format!("Invalid metadata format: {}", e)))?
        };
        drop(read_txn);

        if metadata.schema_version != SCHEMA_VERSION {
            warn!(
                expected = SCHEMA_VERSION,
                found = metadata.schema_version,
                "Schema version mismatch"
            );
            return Err(GalleryDBError::Storage(StorageError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found: metadata.schema_version,
            }));
        }

        if metadata.dimension as usize != config.dimension {
            warn!(
                expected = config.dimension,
                found = metadata.dimension,
                "Feature vector dimension mismatch"
            );
            return Err(GalleryDBError::Validation(
                ValidationError::DimensionMismatch {
                    expected: config.dimension,
                    got: metadata.dimension as usize,
                },
            ));
        }

        let mut metadata = metadata;
        metadata.touch();

        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let metadata_bytes = bincode::serialize(&metadata)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            meta_table.insert(METADATA_KEY, metadata_bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(
            schema_version = metadata.schema_version,
            dimension = metadata.dimension,
            "Database opened successfully"
        );

        Ok(Self::from_parts(db, metadata, path, config))
    }

    fn from_parts(db: Database, metadata: DatabaseMetadata, path: PathBuf, config: &Config) -> Self {
        Self {
            db,
            metadata,
            path,
            sync_mode: config.sync_mode,
            max_colors: config.color.max_colors,
        }
    }

    /// Closes the storage engine.
    ///
    /// redb flushes all data durably on drop, so this cannot fail today.
    #[instrument(skip(self))]
    pub fn close(self) -> Result<()> {
        info!("Closing storage engine");
        drop(self.db);
        info!("Storage engine closed");
        Ok(())
    }

    /// Returns a reference to the underlying redb database.
    #[inline]
    #[cfg(test)]
    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    /// Returns the feature vector dimension configured for this database.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.metadata.dimension as usize
    }

    fn begin_write(&self) -> Result<WriteTransaction> {
        let mut txn = self.db.begin_write().map_err(StorageError::from)?;
        txn.set_durability(if self.sync_mode.is_fast() {
            Durability::Eventual
        } else {
            Durability::Immediate
        });
        Ok(txn)
    }

    fn decode_record(
        &self,
        id: u64,
        bytes: &[u8],
        embeddings: &ReadOnlyTable<u64, &'static [u8]>,
    ) -> Result<ImageRecord> {
        let mut record: ImageRecord = bincode::deserialize(bytes)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        if record.is_completed() {
            let raw = embeddings.get(id)?.ok_or_else(|| {
                StorageError::corrupted(format!("Completed image {} has no feature vector", id))
            })?;
            record.embedding = Some(decode_embedding(raw.value(), self.dimension())?);
        }

        Ok(record)
    }

    /// Re-reads a freshly written record and compares it (paranoid mode).
    fn verify_written(&self, record: &ImageRecord) -> Result<()> {
        match self.find(record.id)? {
            Some(stored) if stored == *record => Ok(()),
            _ => Err(StorageError::corrupted(format!(
                "Read-back verification failed for image {}",
                record.id
            ))
            .into()),
        }
    }

    /// Walks the time index newest-first. Feature vectors are only read
    /// when `with_embeddings` is set.
    fn scan_newest_first(&self, with_embeddings: bool) -> Result<Vec<ImageRecord>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let by_time = read_txn.open_table(IMAGES_BY_TIME_TABLE)?;
        let images = read_txn.open_table(IMAGES_TABLE)?;
        let embeddings = read_txn.open_table(EMBEDDINGS_TABLE)?;

        let mut records = Vec::with_capacity(images.len()? as usize);
        for entry in by_time.iter()?.rev() {
            let (key, _) = entry.map_err(StorageError::from)?;
            let (_, id) = decode_time_key(key.value());
            let Some(value) = images.get(id.as_u64())? else {
                continue;
            };
            let record = if with_embeddings {
                self.decode_record(id.as_u64(), value.value(), &embeddings)?
            } else {
                bincode::deserialize(value.value())
                    .map_err(|e| StorageError::serialization(e.to_string()))?
            };
            records.push(record);
        }

        Ok(records)
    }
}

impl FeatureStore for RedbStorage {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn metadata(&self) -> &DatabaseMetadata {
        &self.metadata
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    // =========================================================================
    // Records
    // =========================================================================

    fn next_id(&self) -> Result<ImageId> {
        let write_txn = self.begin_write()?;
        let id;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let current = match meta_table.get(NEXT_ID_KEY)? {
                Some(raw) => {
                    let bytes: [u8; 8] = raw.value().try_into().map_err(|_| {
                        StorageError::corrupted("Invalid identifier counter")
                    })?;
                    u64::from_le_bytes(bytes)
                }
                None => 1,
            };
            id = current;
            meta_table.insert(NEXT_ID_KEY, (current + 1).to_le_bytes().as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        Ok(ImageId::new(id))
    }

    fn put(&self, record: &ImageRecord) -> Result<()> {
        validate_record(record, self.dimension(), self.max_colors)?;

        let bytes = bincode::serialize(record)
            .map_err(|e| StorageError::serialization(e.to_string()))?;
        let key = record.id.as_u64();

        let write_txn = self.begin_write()?;
        {
            let mut images = write_txn.open_table(IMAGES_TABLE)?;
            let previous = match images.insert(key, bytes.as_slice())? {
                Some(old) => Some(
                    bincode::deserialize::<ImageRecord>(old.value())
                        .map_err(|e| StorageError::serialization(e.to_string()))?,
                ),
                None => None,
            };

            let mut by_time = write_txn.open_table(IMAGES_BY_TIME_TABLE)?;
            if let Some(old) = previous {
                if old.uploaded_at != record.uploaded_at {
                    by_time.remove(&encode_time_key(old.uploaded_at, record.id))?;
                }
            }
            by_time.insert(&encode_time_key(record.uploaded_at, record.id), ())?;

            let mut embeddings = write_txn.open_table(EMBEDDINGS_TABLE)?;
            match &record.embedding {
                Some(embedding) => {
                    embeddings.insert(key, encode_embedding(embedding).as_slice())?;
                }
                None => {
                    embeddings.remove(key)?;
                }
            }
        }
        write_txn.commit().map_err(StorageError::from)?;

        if self.sync_mode.is_paranoid() {
            self.verify_written(record)?;
        }

        debug!(id = %record.id, status = ?record.status, "Image saved");
        Ok(())
    }

    fn find(&self, id: ImageId) -> Result<Option<ImageRecord>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let images = read_txn.open_table(IMAGES_TABLE)?;
        let embeddings = read_txn.open_table(EMBEDDINGS_TABLE)?;

        match images.get(id.as_u64())? {
            Some(value) => Ok(Some(self.decode_record(
                id.as_u64(),
                value.value(),
                &embeddings,
            )?)),
            None => Ok(None),
        }
    }

    fn delete(&self, id: ImageId) -> Result<bool> {
        let key = id.as_u64();
        let write_txn = self.begin_write()?;
        let existed;
        {
            let mut images = write_txn.open_table(IMAGES_TABLE)?;
            let removed = match images.remove(key)? {
                Some(old) => Some(
                    bincode::deserialize::<ImageRecord>(old.value())
                        .map_err(|e| StorageError::serialization(e.to_string()))?,
                ),
                None => None,
            };
            existed = removed.is_some();

            if let Some(old) = removed {
                let mut by_time = write_txn.open_table(IMAGES_BY_TIME_TABLE)?;
                by_time.remove(&encode_time_key(old.uploaded_at, id))?;
            }

            let mut embeddings = write_txn.open_table(EMBEDDINGS_TABLE)?;
            embeddings.remove(key)?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        if existed {
            debug!(id = %id, "Image deleted");
        }
        Ok(existed)
    }

    fn list(&self, page: usize, page_size: usize) -> Result<Vec<ImageRecord>> {
        if page == 0 {
            return Err(ValidationError::invalid_field("page", "must be at least 1").into());
        }
        if page_size == 0 {
            return Err(ValidationError::invalid_field("page_size", "must be at least 1").into());
        }
        let skip = (page - 1).saturating_mul(page_size);

        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let by_time = read_txn.open_table(IMAGES_BY_TIME_TABLE)?;
        let images = read_txn.open_table(IMAGES_TABLE)?;
        let embeddings = read_txn.open_table(EMBEDDINGS_TABLE)?;

        let mut records = Vec::with_capacity(page_size);
        for entry in by_time.iter()?.rev().skip(skip).take(page_size) {
            let (key, _) = entry.map_err(StorageError::from)?;
            let (_, id) = decode_time_key(key.value());
            if let Some(value) = images.get(id.as_u64())? {
                records.push(self.decode_record(id.as_u64(), value.value(), &embeddings)?);
            }
        }

        Ok(records)
    }

    fn list_all(&self) -> Result<Vec<ImageRecord>> {
        self.scan_newest_first(true)
    }

    fn list_all_metadata(&self) -> Result<Vec<ImageRecord>> {
        self.scan_newest_first(false)
    }

    fn count(&self) -> Result<u64> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let images = read_txn.open_table(IMAGES_TABLE)?;
        Ok(images.len()?)
    }

    fn completed_features(&self) -> Result<Vec<StoredFeatures>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let images = read_txn.open_table(IMAGES_TABLE)?;
        let embeddings = read_txn.open_table(EMBEDDINGS_TABLE)?;

        let mut features = Vec::new();
        for entry in images.iter()? {
            let (key, value) = entry.map_err(StorageError::from)?;
            let record = self.decode_record(key.value(), value.value(), &embeddings)?;
            if let (true, Some(embedding)) = (record.is_completed(), record.embedding) {
                features.push(StoredFeatures {
                    id: record.id,
                    embedding,
                    colors: record.colors,
                });
            }
        }

        Ok(features)
    }
}

// RedbStorage is auto Send + Sync: Database, DatabaseMetadata, and PathBuf
// are all Send + Sync.
