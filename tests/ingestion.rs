//! Integration tests for the upload and extraction pipeline.
//!
//! These tests verify:
//! - Background workers drive every upload to a terminal status
//! - Extraction failures are recorded, not returned
//! - A panicking extractor fails its image without stopping ingestion
//! - Concurrent uploads from many threads
//! - Deletion during extraction never resurrects the image

mod common;

use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use common::{caller, encode, rgb};
use gallerydb::{
    Config, ExtractedFeatures, FeatureExtractor, GalleryDB, ImageId, IngestionConfig, NewImage,
    Result,
};
use tempfile::tempdir;

fn worker_config(dimension: usize, workers: usize) -> Config {
    Config {
        dimension,
        ingestion: IngestionConfig {
            workers,
            queue_capacity: 4,
        },
        ..Default::default()
    }
}

// ============================================================================
// Worker Pool
// ============================================================================

#[test]
fn test_workers_complete_uploads() {
    let dir = tempdir().unwrap();
    let db = GalleryDB::open_with_extractor(
        dir.path().join("test.db"),
        worker_config(2, 3),
        common::extractor(),
    )
    .unwrap();
    let me = caller();

    let images: Vec<NewImage> = (0..20)
        .map(|i| {
            NewImage::new(
                format!("{}.jpg", i),
                encode(&[1.0, i as f32], &[rgb("#336699")], "a photo|sample"),
            )
        })
        .collect();
    let pending = db.upload(Some(&me), images).unwrap();
    assert_eq!(pending.len(), 20);
    assert!(pending.iter().all(|r| r.status.is_pending()));
    assert!(pending.iter().all(|r| r.uploaded_by.as_str() == "alice"));

    db.wait_for_ingestion();

    let stats = db.stats(Some(&me)).unwrap();
    assert_eq!(stats.completed, 20);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.indexed_vectors, 20);
    assert_eq!(stats.indexed_colors, 20);

    let record = db.get_image(Some(&me), pending[3].id).unwrap();
    assert_eq!(record.description, "a photo");
    assert!(record.tags.contains("sample"));

    db.close().unwrap();
}

#[test]
fn test_close_drains_queue() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");

    let ids: Vec<ImageId> = {
        let db =
            GalleryDB::open_with_extractor(&path, worker_config(2, 1), common::extractor()).unwrap();
        let images = (0..8)
            .map(|i| NewImage::new(format!("{}.jpg", i), encode(&[1.0, i as f32], &[], "")))
            .collect();
        let pending = db.upload(Some(&caller()), images).unwrap();
        db.close().unwrap();
        pending.into_iter().map(|r| r.id).collect()
    };

    let db = common::open_inline(&path, 2);
    for id in ids {
        assert!(db.get_image(Some(&caller()), id).unwrap().is_completed());
    }
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_extraction_failures_recorded() {
    let dir = tempdir().unwrap();
    let db = common::open_inline(&dir.path().join("test.db"), 3);
    let me = caller();

    let pending = db
        .upload(
            Some(&me),
            vec![
                NewImage::new("good.jpg", encode(&[1.0, 0.0, 0.0], &[], "")),
                NewImage::new("unreadable.jpg", vec![]),
                NewImage::new("short.jpg", encode(&[1.0], &[], "")),
                NewImage::new("nan.jpg", encode(&[1.0, f32::NAN, 0.0], &[], "")),
            ],
        )
        .unwrap();

    let statuses: Vec<_> = pending
        .iter()
        .map(|r| db.get_image(Some(&me), r.id).unwrap().status)
        .collect();
    assert!(statuses[0].is_completed());
    assert_eq!(statuses[1].error(), Some("Extraction error: unreadable image"));
    assert!(statuses[2].error().unwrap().contains("dimension mismatch"));
    assert!(statuses[3].error().unwrap().contains("not finite"));

    // Failed images stay listable but are not indexed
    assert_eq!(db.get_images(Some(&me), 1, 10).unwrap().len(), 4);
    assert_eq!(db.stats(Some(&me)).unwrap().indexed_vectors, 1);
}

/// Panics on `b"boom"`, otherwise decodes like the shared test extractor.
fn panicking_extractor() -> Arc<dyn FeatureExtractor> {
    Arc::new(|bytes: &[u8]| -> Result<ExtractedFeatures> {
        if bytes == b"boom" {
            panic!("decoder crashed");
        }
        common::decode(bytes)
    })
}

#[test]
fn test_extractor_panic_fails_image_and_workers_survive() {
    let dir = tempdir().unwrap();
    let db = GalleryDB::open_with_extractor(
        dir.path().join("test.db"),
        worker_config(2, 1),
        panicking_extractor(),
    )
    .unwrap();
    let me = caller();

    let crashed = db
        .upload(Some(&me), vec![NewImage::new("boom.jpg", b"boom".to_vec())])
        .unwrap()[0]
        .id;
    db.wait_for_ingestion();

    let status = db.get_image(Some(&me), crashed).unwrap().status;
    assert!(status.is_failed());
    assert!(status.error().unwrap().contains("decoder crashed"));

    // The single worker is still alive and takes the next upload
    let next = db
        .upload(
            Some(&me),
            vec![NewImage::new("ok.jpg", encode(&[1.0, 0.0], &[], ""))],
        )
        .unwrap()[0]
        .id;
    db.wait_for_ingestion();
    assert!(db.get_image(Some(&me), next).unwrap().is_completed());

    let stats = db.stats(Some(&me)).unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.failed, 1);
    db.close().unwrap();
}

#[test]
fn test_extractor_panic_inline_fails_image() {
    let dir = tempdir().unwrap();
    let db = GalleryDB::open_with_extractor(
        dir.path().join("test.db"),
        common::inline_config(2),
        panicking_extractor(),
    )
    .unwrap();
    let me = caller();

    let pending = db
        .upload(
            Some(&me),
            vec![
                NewImage::new("boom.jpg", b"boom".to_vec()),
                NewImage::new("ok.jpg", encode(&[0.0, 1.0], &[], "")),
            ],
        )
        .unwrap();

    assert!(db.get_image(Some(&me), pending[0].id).unwrap().status.is_failed());
    assert!(db.get_image(Some(&me), pending[1].id).unwrap().is_completed());
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_uploads() {
    let dir = tempdir().unwrap();
    let db = Arc::new(
        GalleryDB::open_with_extractor(
            dir.path().join("test.db"),
            worker_config(2, 4),
            common::extractor(),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..10 {
                    let bytes = encode(&[t as f32 + 1.0, i as f32], &[], "");
                    db.upload(Some(&caller()), vec![NewImage::new(format!("{}-{}.jpg", t, i), bytes)])
                        .unwrap();
                    // Readers run alongside ingestion
                    db.get_images(Some(&caller()), 1, 5).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    db.wait_for_ingestion();
    let stats = db.stats(Some(&caller())).unwrap();
    assert_eq!(stats.images, 40);
    assert_eq!(stats.completed, 40);
    assert_eq!(stats.indexed_vectors, 40);
}

// ============================================================================
// Cancellation
// ============================================================================

/// Extractor that blocks until the test releases it.
#[derive(Default)]
struct Gate {
    state: Mutex<(bool, bool)>, // (started, released)
    changed: Condvar,
}

impl Gate {
    fn wait_started(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.0 {
            state = self.changed.wait(state).unwrap();
        }
    }

    fn release(&self) {
        self.state.lock().unwrap().1 = true;
        self.changed.notify_all();
    }
}

struct GatedExtractor(Arc<Gate>);

impl FeatureExtractor for GatedExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedFeatures> {
        let gate = &self.0;
        let mut state = gate.state.lock().unwrap();
        state.0 = true;
        gate.changed.notify_all();
        while !state.1 {
            state = gate.changed.wait(state).unwrap();
        }
        drop(state);
        common::decode(bytes)
    }
}

#[test]
fn test_delete_during_extraction_not_resurrected() {
    let dir = tempdir().unwrap();
    let gate = Arc::new(Gate::default());
    let db = GalleryDB::open_with_extractor(
        dir.path().join("test.db"),
        worker_config(2, 1),
        Arc::new(GatedExtractor(Arc::clone(&gate))),
    )
    .unwrap();
    let me = caller();

    let pending = db
        .upload(
            Some(&me),
            vec![NewImage::new("a.jpg", encode(&[1.0, 0.0], &[rgb("#FF0000")], ""))],
        )
        .unwrap();
    let id = pending[0].id;

    gate.wait_started();
    assert!(db.delete_image(Some(&me), id).unwrap());
    gate.release();
    db.wait_for_ingestion();

    assert!(db.get_image(Some(&me), id).unwrap_err().is_not_found());
    let stats = db.stats(Some(&me)).unwrap();
    assert_eq!(stats.images, 0);
    assert_eq!(stats.indexed_vectors, 0);
    assert_eq!(stats.indexed_colors, 0);
    assert!(db.filter_by_color(Some(&me), "#FF0000", 5).unwrap().is_empty());
}
