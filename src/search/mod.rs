//! Read-only query surface for GalleryDB.
//!
//! [`SearchService`] answers listing, text search, similar-image and
//! color-filter queries. Index queries return identifiers; each identifier
//! is resolved through the feature store, and ids whose record vanished or
//! is no longer `completed` are skipped.

mod text;
mod types;

pub use text::TextQuery;
pub use types::{ScoredImage, SearchPage};

use std::sync::Arc;

use tracing::debug;

use crate::color::Rgb;
use crate::config::Config;
use crate::error::{Result, ValidationError};
use crate::image::ImageRecord;
use crate::indexes::Indexes;
use crate::storage::FeatureStore;
use crate::types::ImageId;

pub(crate) struct SearchService {
    store: Arc<dyn FeatureStore>,
    indexes: Arc<Indexes>,
    max_page_size: usize,
    max_result_limit: usize,
}

impl SearchService {
    pub(crate) fn new(store: Arc<dyn FeatureStore>, indexes: Arc<Indexes>, config: &Config) -> Self {
        Self {
            store,
            indexes,
            max_page_size: config.max_page_size,
            max_result_limit: config.max_result_limit,
        }
    }

    fn check_page(&self, page: usize, page_size: usize) -> Result<()> {
        if page == 0 {
            return Err(ValidationError::invalid_field("page", "must be at least 1").into());
        }
        if page_size == 0 || page_size > self.max_page_size {
            return Err(ValidationError::invalid_field(
                "page_size",
                format!("must be between 1 and {}", self.max_page_size),
            )
            .into());
        }
        Ok(())
    }

    /// Lists records newest-first.
    pub(crate) fn get_images(&self, page: usize, page_size: usize) -> Result<Vec<ImageRecord>> {
        self.check_page(page, page_size)?;
        self.store.list(page, page_size)
    }

    /// Text search over filename, description and tags.
    pub(crate) fn search_by_text(
        &self,
        query: &str,
        page: usize,
        page_size: usize,
    ) -> Result<SearchPage> {
        self.check_page(page, page_size)?;

        let query = TextQuery::parse(query);
        let matches: Vec<ImageRecord> = self
            .store
            .list_all_metadata()?
            .into_iter()
            .filter(|record| query.matches(record))
            .collect();

        debug!(tokens = query.tokens().len(), total = matches.len(), "Text search");
        Ok(SearchPage::from_matches(matches, page, page_size))
    }

    /// Nearest completed images to `id` by feature vector, excluding `id`.
    pub(crate) fn find_similar(&self, id: ImageId, limit: usize) -> Result<Vec<ScoredImage>> {
        let source = self.store.get(id)?;
        let limit = limit.min(self.max_result_limit);
        if limit == 0 || !source.is_completed() {
            return Ok(Vec::new());
        }

        let neighbors = match self.indexes.vectors()?.query_similar_to(id, limit) {
            Ok(neighbors) => neighbors,
            // Completed but not yet (or no longer) indexed
            Err(e) if e.is_not_found() || e.is_empty_index() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        self.resolve(neighbors.into_iter().map(|n| (n.id, n.distance)))
    }

    /// Completed images with a dominant color near `color`.
    pub(crate) fn filter_by_color(&self, color: &str, limit: usize) -> Result<Vec<ScoredImage>> {
        let target = Rgb::parse(color)?;
        let limit = limit.min(self.max_result_limit);

        let matches = self.indexes.colors().query(target, limit)?;
        self.resolve(matches.into_iter().map(|m| (m.id, m.distance)))
    }

    fn resolve(&self, ranked: impl Iterator<Item = (ImageId, f32)>) -> Result<Vec<ScoredImage>> {
        let mut results = Vec::new();
        for (id, distance) in ranked {
            match self.store.find(id)? {
                Some(image) if image.is_completed() => results.push(ScoredImage { image, distance }),
                _ => debug!(id = %id, "Skipping stale index entry"),
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ExtractedFeatures, NewImage};
    use crate::storage::RedbStorage;
    use crate::types::{Timestamp, UserId};
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        store: Arc<dyn FeatureStore>,
        indexes: Arc<Indexes>,
        search: SearchService,
    }

    fn setup() -> Fixture {
        let dir = tempdir().unwrap();
        let mut config = Config::with_dimension(2);
        config.max_page_size = 10;
        config.max_result_limit = 3;
        let store: Arc<dyn FeatureStore> =
            Arc::new(RedbStorage::open(dir.path().join("t.db"), &config).unwrap());
        let indexes = Arc::new(Indexes::new(&config));
        let search = SearchService::new(Arc::clone(&store), Arc::clone(&indexes), &config);
        Fixture {
            _dir: dir,
            store,
            indexes,
            search,
        }
    }

    fn add(f: &Fixture, name: &str, embedding: Option<Vec<f32>>, colors: Vec<Rgb>) -> ImageId {
        let id = f.store.next_id().unwrap();
        let pending = ImageRecord::pending(
            id,
            &NewImage::new(name, vec![]),
            UserId::new("u"),
            Timestamp::from_millis(id.as_u64() as i64),
        );
        let record = match embedding {
            Some(embedding) => pending.completed(ExtractedFeatures {
                embedding,
                colors,
                description: format!("photo of {}", name),
                ..Default::default()
            }),
            None => pending,
        };
        f.store.put(&record).unwrap();
        if let Some(embedding) = &record.embedding {
            f.indexes.insert(id, embedding, &record.colors).unwrap();
        }
        id
    }

    // ========================================================================
    // Paging
    // ========================================================================

    #[test]
    fn test_page_bounds_rejected() {
        let f = setup();
        assert!(f.search.get_images(0, 5).unwrap_err().is_validation());
        assert!(f.search.get_images(1, 0).unwrap_err().is_validation());
        assert!(f.search.get_images(1, 11).unwrap_err().is_validation());
        assert!(f.search.search_by_text("", 0, 5).unwrap_err().is_validation());
    }

    #[test]
    fn test_text_search_newest_first() {
        let f = setup();
        let a = add(&f, "cat-1.jpg", None, vec![]);
        let _dog = add(&f, "dog.jpg", None, vec![]);
        let b = add(&f, "cat-2.jpg", None, vec![]);

        let page = f.search.search_by_text("CAT", 1, 10).unwrap();
        let ids: Vec<ImageId> = page.images.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b, a]);
        assert_eq!(page.total, 2);
        assert!(!page.has_more);
    }

    // ========================================================================
    // Similarity
    // ========================================================================

    #[test]
    fn test_find_similar_excludes_source() {
        let f = setup();
        let a = add(&f, "a", Some(vec![1.0, 0.0]), vec![]);
        let b = add(&f, "b", Some(vec![0.9, 0.1]), vec![]);
        let c = add(&f, "c", Some(vec![-1.0, 0.0]), vec![]);

        let results = f.search.find_similar(a, 2).unwrap();
        let ids: Vec<ImageId> = results.iter().map(|s| s.image.id).collect();
        assert_eq!(ids, vec![b, c]);
    }

    #[test]
    fn test_find_similar_limit_capped() {
        let f = setup();
        let a = add(&f, "a", Some(vec![1.0, 0.0]), vec![]);
        for i in 0..6 {
            add(&f, "x", Some(vec![1.0, i as f32]), vec![]);
        }
        assert_eq!(f.search.find_similar(a, 50).unwrap().len(), 3);
        assert!(f.search.find_similar(a, 0).unwrap().is_empty());
    }

    #[test]
    fn test_find_similar_unknown_and_pending() {
        let f = setup();
        assert!(f.search.find_similar(ImageId::new(99), 3).unwrap_err().is_not_found());

        let pending = add(&f, "p", None, vec![]);
        assert!(f.search.find_similar(pending, 3).unwrap().is_empty());
    }

    #[test]
    fn test_stale_index_entry_skipped() {
        let f = setup();
        let a = add(&f, "a", Some(vec![1.0, 0.0]), vec![]);
        let b = add(&f, "b", Some(vec![0.9, 0.1]), vec![]);
        // Removed from the store behind the index's back
        f.store.delete(b).unwrap();

        assert!(f.search.find_similar(a, 3).unwrap().is_empty());
    }

    // ========================================================================
    // Color
    // ========================================================================

    #[test]
    fn test_filter_by_color() {
        let f = setup();
        let red = add(&f, "r", Some(vec![1.0, 0.0]), vec![Rgb::new(255, 0, 0)]);
        let near = add(&f, "n", Some(vec![1.0, 0.0]), vec![Rgb::new(254, 1, 1)]);
        let _blue = add(&f, "b", Some(vec![1.0, 0.0]), vec![Rgb::new(0, 0, 255)]);

        let results = f.search.filter_by_color("#FF0000", 2).unwrap();
        let ids: Vec<ImageId> = results.iter().map(|s| s.image.id).collect();
        assert_eq!(ids, vec![red, near]);
        assert_eq!(results[0].distance, 0.0);
    }

    #[test]
    fn test_filter_by_invalid_color() {
        let f = setup();
        let err = f.search.filter_by_color("not-a-color", 5).unwrap_err();
        assert!(err.is_invalid_color());
    }
}
